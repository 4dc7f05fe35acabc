/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Trace engine: for every atom, the set of indicator indices
//! compatible with it.
//!
//! Grounded in `aml_fast.c`'s `getFreeTraceOfTerm`, `freeTraceAll`,
//! `calculateTraceOfAtom`, `getTraceOfTerm`, `traceAll`,
//! `storeTracesOfConstants`, and the `TraceHelper_*` family. Tiled
//! parallelism follows the same shape as `traceAll`'s OpenMP loop nest:
//! indicators are chunked into fixed-size tiles so a tile's filter sets
//! stay resident while every space element is swept against it.

use rayon::prelude::*;

use crate::cam::{AtomS, AtomizationS, Constant, Cs, Lcs, Tracer};
use crate::cbs::Cbs;
use crate::error::TraceErrorPolicy;

/// Indicator iteration is broken into tiles of this size so a tile's
/// filter sets stay cache-resident while every space element sweeps
/// across it. Matches the ≈5000 tile size named in `spec.md` §4.4.
pub const TRACE_TILE_SIZE: usize = 5000;

/// The free trace of a term: indicators compatible with `t` ignoring
/// the atomization. A positive indicator `k` is compatible iff
/// `t ⊆ indicator_k`; a negative atom-indicator `k'` (at slot `Ni+k'`)
/// is compatible iff it is disjoint from `t`.
pub fn free_trace_of_term(t: &Cbs, tracer: &Tracer) -> Cbs {
    let mut trace = Cbs::new();
    for k in 0..tracer.ni() {
        if Cbs::is_subset(t, &tracer.indicators[k]) {
            trace.add_bit(k as u64);
        }
    }
    for k in 0..tracer.nai() {
        if Cbs::is_disjoint(t, &tracer.atom_indicators[k]) {
            trace.add_bit((tracer.ni() + k) as u64);
        }
    }
    trace
}

/// Fills `atom.trace` as the union, over each constant `c` in
/// `atom.ucs`, of `free_trace_of_term({c}, tracer)`.
///
/// Precondition: `atom.trace` is empty. This is *not* the same as
/// `free_trace_of_term(atom.ucs, tracer)` directly — a positive
/// indicator that contains every individual constant of the UCS but
/// not their union incorrectly, or a negative atom-indicator disjoint
/// from each constant individually but not from the union, can diverge.
/// The union-of-singletons definition is the one the rest of the
/// engine relies on.
pub fn compute_atom_trace(atom: &mut AtomS, tracer: &Tracer) {
    assert!(atom.trace.is_empty(), "compute_atom_trace precondition: atom.trace must be empty");
    for c in atom.ucs.iter() {
        let singleton = Cbs::from_iter_sorted([c]);
        let ft = free_trace_of_term(&singleton, tracer);
        Cbs::union_into(&mut atom.trace, &ft);
    }
}

/// The trace of a term under an atomization: start from the full
/// indicator universe and intersect with every atom's trace whose UCS
/// touches the term.
pub fn trace_of_term(t: &Cbs, tracer: &Tracer, atomization: &AtomizationS) -> Cbs {
    let mut trace = full_universe(tracer.nt());
    for atom in &atomization.atoms {
        if !Cbs::is_disjoint(&atom.ucs, t) {
            Cbs::intersect_into(&mut trace, &atom.trace);
        }
    }
    trace
}

fn full_universe(nt: usize) -> Cbs {
    Cbs::from_iter_sorted(0..nt as u64)
}

/// Fills every atom's trace, then every space element's trace under
/// the atomization. Indicator iteration inside `compute_atom_trace`
/// proceeds tile-by-tile so each tile's filter sets stay resident while
/// the (parallel) outer loop over space elements sweeps it.
pub fn compute_all_traces(space: &mut [Cbs], tracer: &Tracer, atomization: &mut AtomizationS) {
    atomization
        .atoms
        .par_iter_mut()
        .filter(|a| a.trace.is_empty())
        .for_each(|atom| compute_atom_trace(atom, tracer));

    // Indicator space is swept tile by tile (≈TRACE_TILE_SIZE wide) so
    // each tile's filter sets stay cache-resident; within a tile the
    // outer loop over space elements runs in parallel, matching the
    // loop nest `traceAll` uses.
    let nt = tracer.nt();
    let universe = full_universe(nt);
    let mut per_element_trace: Vec<Cbs> = vec![universe; space.len()];

    let mut tile_start = 0usize;
    while tile_start < nt {
        let tile_end = (tile_start + TRACE_TILE_SIZE).min(nt);
        per_element_trace.par_iter_mut().zip(space.par_iter()).for_each(|(trace, e)| {
            for atom in &atomization.atoms {
                if !Cbs::is_disjoint(&atom.ucs, e) {
                    for k in tile_start..tile_end {
                        if trace.contains(k as u64) && !atom.trace.contains(k as u64) {
                            trace.remove_bit(k as u64);
                        }
                    }
                }
            }
        });
        tile_start = tile_end;
    }

    for (e, trace) in space.iter_mut().zip(per_element_trace.into_iter()) {
        *e = trace;
    }
}

/// For each constant, the trace of its singleton term under the
/// atomization, sharing the prebuilt full-indicator universe across
/// constants.
pub fn store_traces_of_constants(
    constants: &Cs,
    atomization: &AtomizationS,
    tracer: &Tracer,
) -> Vec<(Constant, Cbs)> {
    let nt = tracer.nt();
    constants
        .iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|c| {
            let singleton = Cbs::from_iter_sorted([c]);
            let mut trace = full_universe(nt);
            for atom in &atomization.atoms {
                if !Cbs::is_disjoint(&atom.ucs, &singleton) {
                    Cbs::intersect_into(&mut trace, &atom.trace);
                }
            }
            (c, trace)
        })
        .collect()
}

/// Cache of inverse traces keyed by atom ID: `t_d[e]` holds the set of
/// cached atom IDs whose trace does NOT contain indicator `e`.
///
/// Grounded in `TraceHelper_init`/`TraceHelper_update` in `aml_fast.c`.
pub struct TraceHelper {
    pub max_trace: Cbs,
    pub t_d: Vec<Cbs>,
    pub atom_ids: Cbs,
    pub next_id: u32,
}

impl TraceHelper {
    pub fn init(nt: usize) -> Self {
        Self { max_trace: full_universe(nt), t_d: vec![Cbs::new(); nt], atom_ids: Cbs::new(), next_id: 0 }
    }

    /// Updates the cache for a batch of atoms.
    ///
    /// If `complete`, `lr_r` must be empty and every atom ID in
    /// `atomization` becomes the output and the new cached set.
    /// Otherwise `lr_r` names atomization indices whose IDs are merged
    /// into the cached set. Returns the IDs considered "new" this call
    /// (`ids_out \ previous cached atom_ids`), for which `t_d` is
    /// populated.
    pub fn update(&mut self, atomization: &mut AtomizationS, lr_r: &[usize], complete: bool) -> Vec<u32> {
        if !atomization.is_sorted_by_id() {
            atomization.sort_by_id();
        }

        let ids_out: Vec<u32> = if complete {
            assert!(lr_r.is_empty(), "TraceHelper::update: complete requires an empty lr_r");
            atomization.ids()
        } else {
            lr_r.iter().map(|&i| atomization.atoms[i].id).collect()
        };

        let previous_ids: std::collections::HashSet<u64> = self.atom_ids.iter().collect();
        let new_ids: Vec<u32> =
            ids_out.iter().copied().filter(|&id| !previous_ids.contains(&(id as u64))).collect();

        let mut updated_ids = self.atom_ids.clone();
        for &id in &ids_out {
            updated_ids.add_bit(id as u64);
        }
        self.atom_ids = updated_ids;

        let id_to_atom: std::collections::HashMap<u32, &AtomS> =
            atomization.atoms.iter().map(|a| (a.id, a)).collect();
        for &id in &new_ids {
            let atom = id_to_atom[&id];
            let out = {
                let mut o = self.max_trace.clone();
                Cbs::subtract_into(&mut o, &atom.trace);
                o
            };
            for ind in out.iter() {
                self.t_d[ind as usize].add_bit(id as u64);
            }
        }

        new_ids
    }
}

/// Resolves a trace error B condition (`t_d[e]` empty when a candidate
/// was required) per the given policy, returning whether the caller
/// should skip `indicator` and continue.
pub fn handle_trace_error(policy: TraceErrorPolicy, indicator: usize, operation: &'static str) -> bool {
    policy.handle(indicator, operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cam::Ucs;

    fn make_tracer() -> Tracer {
        Tracer {
            indicators: vec![
                Lcs(Cbs::from_iter_sorted([0, 1])),
                Lcs(Cbs::from_iter_sorted([1, 2])),
                Lcs(Cbs::from_iter_sorted([0, 1, 2])),
            ],
            atom_indicators: vec![Lcs(Cbs::from_iter_sorted([3])), Lcs(Cbs::from_iter_sorted([4]))],
        }
    }

    #[test]
    fn free_trace_scenario_from_spec() {
        let tracer = make_tracer();
        let t = Cbs::from_iter_sorted([1]);
        let trace = free_trace_of_term(&t, &tracer);
        assert_eq!(trace.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn compute_atom_trace_matches_union_of_singletons() {
        let tracer = make_tracer();
        let mut atom = AtomS::new(Ucs(Cbs::from_iter_sorted([0, 2])), 0);
        compute_atom_trace(&mut atom, &tracer);
        let t0 = free_trace_of_term(&Cbs::from_iter_sorted([0]), &tracer);
        let t2 = free_trace_of_term(&Cbs::from_iter_sorted([2]), &tracer);
        let mut expected = t0;
        Cbs::union_into(&mut expected, &t2);
        assert!(Cbs::equal(&atom.trace, &expected));
    }

    #[test]
    fn trace_helper_tracks_inverse_trace() {
        let tracer = make_tracer();
        let mut helper = TraceHelper::init(tracer.nt());
        let mut m = AtomizationS::new();
        let mut a0 = AtomS::new(Ucs(Cbs::from_iter_sorted([0])), 0);
        compute_atom_trace(&mut a0, &tracer);
        m.push(a0);
        let new_ids = helper.update(&mut m, &[], true);
        assert_eq!(new_ids, vec![0]);
        // Indicator 1 ({1,2}) does not cover constant {0}, so atom 0's
        // trace excludes it, and t_d[1] should contain atom ID 0.
        assert!(helper.t_d[1].contains(0));
    }
}
