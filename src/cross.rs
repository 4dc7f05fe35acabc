/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Crossing core: the atomization-refinement loop.
//!
//! Grounded in `aml_fast.c`'s `enforce`, `cross`, `atomization_product`,
//! `atom_union`, `reduction_by_traces`, `crossAll`,
//! `updateUnionModelWithSetOfPduples`, `selectAllUsefulIndicators`, and
//! `reduceIndicators`, plus `considerPositiveDuples` and
//! `calculateLowerAtomicSegments` (named in `spec.md` §6's host API list
//! but only lightly specified in §4.5 — see `SPEC_FULL.md`).

use std::collections::HashMap;

use dsi_progress_logger::prelude::*;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

use crate::cam::{AtomS, AtomizationS, Constant, Cs, Duple, Ucs};
use crate::cbs::Cbs;
use crate::error::TraceErrorPolicy;
use crate::trace::TraceHelper;

/// Recognised options for `crossAll` and friends (`spec.md` §6's
/// `CrossAll_Params`).
#[derive(Debug, Clone)]
pub struct CrossAllParams {
    /// Must be `false`: redundancy calculation is not implemented.
    pub calculate_redundancy: bool,
    pub remove_repetitions: bool,
    pub verbose: bool,
    pub use_tracehelper: bool,
    pub simplify_threshold: f32,
    pub ignore_single_const_ucs: bool,
    /// Policy for a trace error B condition (`t_d[e]` empty when a
    /// candidate was required). Exposed explicitly rather than guessed,
    /// per `spec.md` §9's open question about the source's
    /// inconsistency between `atomization_product` and
    /// `reduction_by_traces`.
    pub trace_error_policy: TraceErrorPolicy,
}

impl Default for CrossAllParams {
    fn default() -> Self {
        Self {
            calculate_redundancy: false,
            remove_repetitions: false,
            verbose: false,
            use_tracehelper: true,
            simplify_threshold: 2.0,
            ignore_single_const_ucs: false,
            trace_error_policy: TraceErrorPolicy::from_strict_flag(cfg!(feature = "strict_trace_errors")),
        }
    }
}

/// `enforce(M, L, H, params)`: advance the epoch, enforce the duple via
/// `cross`, and optionally deduplicate.
#[allow(clippy::too_many_arguments)]
pub fn enforce(
    m: &mut AtomizationS,
    l: &Cbs,
    h: &Cbs,
    epoch: &mut u32,
    next_id: &mut u32,
    max_trace: &Cbs,
    helper: Option<&mut TraceHelper>,
    params: &CrossAllParams,
    rng: &mut impl Rng,
) {
    assert!(!params.calculate_redundancy, "calculate_redundancy is not implemented");
    *epoch += 1;
    cross(m, l, h, *epoch, next_id, max_trace, helper, params.trace_error_policy, rng);
    if params.remove_repetitions {
        remove_repeated_atoms(m);
    }
}

/// Partitions atoms into `discriminant` (witness the violation) and
/// `lr_r` (intersect H), builds the atomic product, and splices it in.
pub fn cross(
    m: &mut AtomizationS,
    l: &Cbs,
    h: &Cbs,
    epoch: u32,
    next_id: &mut u32,
    max_trace: &Cbs,
    helper: Option<&mut TraceHelper>,
    policy: TraceErrorPolicy,
    rng: &mut impl Rng,
) {
    let discriminant: Vec<usize> = m
        .atoms
        .iter()
        .enumerate()
        .filter(|(_, a)| !Cbs::is_disjoint(&a.ucs, l) && Cbs::is_disjoint(&a.ucs, h))
        .map(|(i, _)| i)
        .collect();
    assert!(!discriminant.is_empty(), "cross: discriminant must be non-empty on entry");

    let lr_r: Vec<usize> =
        m.atoms.iter().enumerate().filter(|(_, a)| !Cbs::is_disjoint(&a.ucs, h)).map(|(i, _)| i).collect();

    let product = atomization_product(m, &discriminant, &lr_r, epoch, next_id, max_trace, helper, policy, rng);

    m.remove_atoms(discriminant);
    for atom in product {
        m.push(atom);
    }
}

/// For each discriminant atom, repeatedly narrows the uncovered
/// indicator set by crossing against a candidate right-hand atom until
/// it is exhausted, producing one product atom per discriminant atom.
#[allow(clippy::too_many_arguments)]
pub fn atomization_product(
    m: &AtomizationS,
    discriminant: &[usize],
    lr_r: &[usize],
    epoch: u32,
    next_id: &mut u32,
    max_trace: &Cbs,
    mut helper: Option<&mut TraceHelper>,
    policy: TraceErrorPolicy,
    rng: &mut impl Rng,
) -> Vec<AtomS> {
    let mut product = Vec::with_capacity(discriminant.len());

    for &i in discriminant {
        let at_l = &m.atoms[i];
        let mut out = max_trace.clone();
        Cbs::subtract_into(&mut out, &at_l.trace);

        let mut picked_any = false;
        while !out.is_empty() {
            let eta = out.choose(rng).unwrap();

            // t_d_eta holds candidate right-hand atoms for indicator
            // eta, as global indices into `m.atoms`.
            let t_d_eta: Cbs = if let Some(h) = helper.as_deref_mut() {
                // Per spec.md §9's open question: the cache's tD[e] is
                // first intersected with the live atomIDs (a
                // compaction, written back), then locally narrowed to
                // the atoms in LrR without writing that narrowing back.
                Cbs::intersect_into(&mut h.t_d[eta as usize], &h.atom_ids);
                let candidate_ids = h.t_d[eta as usize].clone();
                let id_to_index: HashMap<u32, usize> =
                    m.atoms.iter().enumerate().map(|(idx, a)| (a.id, idx)).collect();
                candidate_ids
                    .iter()
                    .filter_map(|id| id_to_index.get(&(id as u32)).copied())
                    .filter(|j| lr_r.contains(j))
                    .map(|j| j as u64)
                    .collect()
            } else {
                lr_r.iter().filter(|&&j| !m.atoms[j].trace.contains(eta)).map(|&j| j as u64).collect()
            };

            if t_d_eta.is_empty() {
                if policy.handle(eta as usize, "atomization_product") {
                    out.remove_bit(eta);
                    continue;
                }
            }

            let chosen = t_d_eta.choose(rng).unwrap();
            let at_r = &m.atoms[chosen as usize];

            Cbs::intersect_into(&mut out, &at_r.trace);
            product.push(atom_union(at_l, at_r, epoch, next_id, helper.is_some()));
            picked_any = true;
        }

        if !picked_any {
            let at_r = &m.atoms[*lr_r.first().expect("LrR must be non-empty when discriminant is")];
            product.push(atom_union(at_l, at_r, epoch, next_id, helper.is_some()));
        }
    }

    product
}

/// `atom_union(a, b, epoch)`: the asymmetric atomic product of two
/// atoms. `G = max(a.g + 1, b.g)` deliberately does not commute.
pub fn atom_union(a: &AtomS, b: &AtomS, epoch: u32, next_id: &mut u32, assign_id: bool) -> AtomS {
    let mut ucs = a.ucs.clone();
    Cbs::union_into(&mut ucs, &b.ucs);
    let mut trace = a.trace.clone();
    Cbs::union_into(&mut trace, &b.trace);

    let id = if assign_id {
        let id = *next_id;
        *next_id += 1;
        id
    } else {
        0
    };

    AtomS {
        ucs: Ucs(ucs),
        trace: crate::cam::Lcs(trace),
        epoch,
        g: (a.g + 1).max(b.g),
        gen: a.gen.max(b.gen),
        id,
    }
}

/// Precomputes, for each constant, the indices of atoms whose UCS
/// contains it (`las[c]` in `spec.md` §4.5.4).
pub fn calculate_lower_atomic_segments(
    constants: &Cs,
    atomization: &AtomizationS,
) -> HashMap<Constant, Vec<usize>> {
    let mut las: HashMap<Constant, Vec<usize>> = atomization
        .atoms
        .iter()
        .enumerate()
        .flat_map(|(i, atom)| atom.ucs.iter().map(move |c| (c, i)))
        .into_group_map();
    for c in constants.iter() {
        las.entry(c).or_default();
    }
    las
}

/// Selects a minimal subset of atoms such that every constant's stored
/// trace is preserved, then drops the rest.
pub fn reduction_by_traces(
    m: &mut AtomizationS,
    constants: &Cs,
    stored_trace_of_constant: &HashMap<Constant, Cbs>,
    max_trace: &Cbs,
    helper: Option<&mut TraceHelper>,
    policy: TraceErrorPolicy,
    rng: &mut impl Rng,
) {
    let las = calculate_lower_atomic_segments(constants, m);
    let mut order: Vec<Constant> = constants.iter().collect();
    order.shuffle(rng);

    let mut selected: std::collections::HashSet<usize> = std::collections::HashSet::new();

    for c in order {
        let trace_c = stored_trace_of_constant.get(&c).cloned().unwrap_or_default();
        let mut out = max_trace.clone();
        Cbs::subtract_into(&mut out, &trace_c);

        let atoms_for_c = las.get(&c).cloned().unwrap_or_default();

        if out.is_empty() {
            if !atoms_for_c.iter().any(|a| selected.contains(a)) {
                if let Some(&a) = atoms_for_c.choose(rng) {
                    selected.insert(a);
                }
            }
            continue;
        }

        while !out.is_empty() {
            let eta = out.choose(rng).unwrap();
            let candidates: Vec<usize> = atoms_for_c
                .iter()
                .copied()
                .filter(|&a| !m.atoms[a].trace.contains(eta))
                .collect();

            if candidates.is_empty() {
                if policy.handle(eta as usize, "reduction_by_traces") {
                    out.remove_bit(eta);
                    continue;
                }
            }

            let aux: Vec<usize> = candidates.iter().copied().filter(|a| selected.contains(a)).collect();
            let picked = if aux.is_empty() {
                let &a = candidates.choose(rng).expect("candidates checked non-empty above");
                selected.insert(a);
                a
            } else {
                *aux.choose(rng).unwrap()
            };
            Cbs::intersect_into(&mut out, &m.atoms[picked].trace);
        }
    }

    let to_remove: Vec<usize> =
        (0..m.len()).filter(|i| !selected.contains(i)).collect();
    m.remove_atoms(to_remove);

    if let Some(h) = helper {
        h.update(m, &[], true);
    }
}

/// Result of `crossAll`.
pub struct CrossAllResult {
    pub crossed: Vec<usize>,
    pub not_crossed: Vec<usize>,
    pub last_j: Option<usize>,
    pub final_epoch: u32,
    pub final_size: usize,
}

/// Iterates positive duples in the given order, enforcing each that is
/// not already satisfied, periodically simplifying, and finishing with
/// a mandatory `reduction_by_traces` call.
#[allow(clippy::too_many_arguments)]
pub fn cross_all(
    m: &mut AtomizationS,
    constants: &Cs,
    positive_duples: &[Duple],
    stored_trace_of_constant: &HashMap<Constant, Cbs>,
    max_trace: &Cbs,
    params: &CrossAllParams,
    do_not_store: &[bool],
    mut epoch: u32,
    mut next_id: u32,
    mut helper: Option<&mut TraceHelper>,
    rng: &mut impl Rng,
) -> CrossAllResult {
    let mut crossed = Vec::new();
    let mut not_crossed = Vec::new();
    let mut last_j = None;
    let mut last_number_of_atoms = m.len();

    let mut pl = ProgressLogger::default();
    if params.verbose {
        pl.start("crossing positive duples");
    }

    for (j, duple) in positive_duples.iter().enumerate() {
        if lower_or_equal(&duple.l, &duple.h, m) {
            if !do_not_store.get(j).copied().unwrap_or(false) {
                not_crossed.push(j);
            }
        } else {
            enforce(m, &duple.l, &duple.h, &mut epoch, &mut next_id, max_trace, helper.as_deref_mut(), params, rng);
            crossed.push(j);
            last_j = Some(j);

            let effective_size = if params.ignore_single_const_ucs {
                m.atoms.iter().filter(|a| a.ucs.cardinality() > 1).count()
            } else {
                m.len()
            };
            if effective_size as f32 > params.simplify_threshold * last_number_of_atoms as f32 {
                reduction_by_traces(
                    m,
                    constants,
                    stored_trace_of_constant,
                    max_trace,
                    helper.as_deref_mut(),
                    params.trace_error_policy,
                    rng,
                );
                last_number_of_atoms = m.len();
            }
        }
        if params.verbose {
            pl.update();
        }
    }
    if params.verbose {
        pl.done();
    }

    reduction_by_traces(m, constants, stored_trace_of_constant, max_trace, helper, params.trace_error_policy, rng);

    CrossAllResult { crossed, not_crossed, last_j, final_epoch: epoch, final_size: m.len() }
}

/// `true` iff `cross(M, L, H)` would find an empty discriminant, i.e.
/// the duple is already satisfied.
pub fn lower_or_equal(l: &Cbs, h: &Cbs, m: &AtomizationS) -> bool {
    !m.atoms.iter().any(|a| !Cbs::is_disjoint(&a.ucs, l) && Cbs::is_disjoint(&a.ucs, h))
}

/// Pre-pass classifying each positive duple as already satisfied or
/// pending, without mutating the atomization. Supplements `crossAll`:
/// the original engine uses this to build the `do_not_store` bitmap.
pub fn consider_positive_duples(m: &AtomizationS, positive_duples: &[Duple]) -> Vec<bool> {
    positive_duples.iter().map(|d| lower_or_equal(&d.l, &d.h, m)).collect()
}

/// For each atom in a union-model atomization, partitions it into
/// keep / deleted / excluded against a set of timestamped duples.
///
/// Parallelised over a fixed number of lanes (`UNION_MODEL_LANES`
/// worker lanes, interleaved `at_idx = round * lanes + lane` over the
/// atomization range), each lane computing verdicts for its own
/// disjoint stripe of atom indices with no shared mutable state, so
/// the result is independent of how many lanes rayon actually runs
/// concurrently. Matches the 960-lane striping in
/// `updateUnionModelWithSetOfPduples`.
pub struct UnionModelUpdate {
    pub keep: Cbs,
    pub deleted: Cbs,
    pub excluded: Cbs,
}

const UNION_MODEL_LANES: usize = 960;

pub fn update_union_model_with_set_of_pduples(
    atomization: &AtomizationS,
    duples: &[Duple],
    union_update_entrance: &[u32],
    last_union_update: &[u32],
) -> UnionModelUpdate {
    let n = atomization.len();
    assert_eq!(union_update_entrance.len(), n);

    // Duples sorted by `last_union_update` descending, so the walk
    // below can stop as soon as the atom is no longer newer than the
    // duple under inspection.
    let mut order: Vec<usize> = (0..duples.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(last_union_update[i]));

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Verdict {
        Keep,
        Deleted,
        Excluded,
    }

    let lanes = UNION_MODEL_LANES.min(n.max(1));
    let verdicts: Vec<Verdict> = (0..lanes)
        .into_par_iter()
        .flat_map_iter(|lane| {
            let order = &order;
            (lane..n).step_by(lanes).map(move |at_idx| {
                let atom = &atomization.atoms[at_idx];
                let entrance = union_update_entrance[at_idx];
                let mut verdict = Verdict::Keep;
                for &r in order {
                    if entrance > last_union_update[r] {
                        break;
                    }
                    let d = &duples[r];
                    if !Cbs::is_disjoint(&atom.ucs, &d.l) && Cbs::is_disjoint(&atom.ucs, &d.h) {
                        verdict = if d.hyp { Verdict::Excluded } else { Verdict::Deleted };
                        break;
                    }
                }
                (at_idx, verdict)
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .fold(vec![Verdict::Keep; n], |mut acc, (idx, v)| {
            acc[idx] = v;
            acc
        });

    let mut keep = Cbs::new();
    let mut deleted = Cbs::new();
    let mut excluded = Cbs::new();
    for (i, v) in verdicts.into_iter().enumerate() {
        match v {
            Verdict::Keep => {
                keep.add_bit(i as u64);
            }
            Verdict::Deleted => {
                deleted.add_bit(i as u64);
            }
            Verdict::Excluded => {
                excluded.add_bit(i as u64);
            }
        }
    }

    UnionModelUpdate { keep, deleted, excluded }
}

/// Result of `selectAllUsefulIndicators`.
pub struct SelectedIndicators {
    pub take: Cbs,
    pub considered_duples: Vec<usize>,
}

/// For each duple, `tDisc = t(H) \ t(L)` is the set of useful
/// indicators. A non-hypothetical duple with an empty `tDisc` makes the
/// input inconsistent.
pub fn select_all_useful_indicators(
    duples_free_traces: &[(Cbs, Cbs, bool)], // (t(L), t(H), hyp)
) -> crate::error::AmlResult<SelectedIndicators> {
    let mut take = Cbs::new();
    let mut considered = Vec::new();
    for (i, (t_l, t_h, hyp)) in duples_free_traces.iter().enumerate() {
        let mut t_disc = t_h.clone();
        Cbs::subtract_into(&mut t_disc, t_l);
        if t_disc.is_empty() {
            if !hyp {
                return Err(crate::error::AmlError::InconsistentInput { duple_index: i });
            }
            continue;
        }
        Cbs::union_into(&mut take, &t_disc);
        considered.push(i);
    }
    Ok(SelectedIndicators { take, considered_duples: considered })
}

/// Greedy round-robin indicator reduction. Preserves: every
/// non-hypothetical duple keeps at least one indicator in its `tDisc`.
pub fn reduce_indicators(
    nt: usize,
    duples_t_disc: &[(Cbs, bool)],
    rng: &mut impl Rng,
) -> Cbs {
    let mut take = Cbs::new();
    let mut singles = Cbs::new();
    let mut discarded = Cbs::new();

    loop {
        let mut order: Vec<usize> = (0..duples_t_disc.len()).collect();
        order.shuffle(rng);

        let before = take.cardinality() + singles.cardinality();

        for &i in &order {
            let (t_disc, _hyp) = &duples_t_disc[i];
            let mut remaining = t_disc.clone();
            Cbs::subtract_into(&mut remaining, &discarded);
            if remaining.is_empty() {
                continue;
            }
            if remaining.cardinality() == 1 {
                let only = remaining.iter().next().unwrap();
                singles.add_bit(only);
                continue;
            }
            if Cbs::is_disjoint(&remaining, &take) {
                if let Some(representative) = remaining.choose(rng) {
                    take.add_bit(representative);
                }
            }
        }

        let mut union_take = take.clone();
        Cbs::union_into(&mut union_take, &singles);
        discarded = full_universe_excluding(nt, &union_take);

        let after = take.cardinality() + singles.cardinality();
        if after <= before {
            break;
        }
    }

    let mut result = take;
    Cbs::union_into(&mut result, &singles);
    result
}

fn full_universe_excluding(nt: usize, keep: &Cbs) -> Cbs {
    let mut universe = Cbs::from_iter_sorted(0..nt as u64);
    Cbs::subtract_into(&mut universe, keep);
    universe
}

/// Detects atoms with a duplicate UCS (grounded in `cbar.c`'s
/// `get_repeated_atoms`).
pub fn get_repeated_atoms(atomization: &AtomizationS) -> Vec<usize> {
    let mut seen = crate::cbs::CbsHashSet::new();
    let mut repeated = Vec::new();
    for (i, atom) in atomization.atoms.iter().enumerate() {
        if seen.contains(&atom.ucs) {
            repeated.push(i);
        } else {
            seen.add(atom.ucs.clone().0);
        }
    }
    repeated
}

/// Removes atoms whose UCS duplicates an earlier atom's, releasing
/// their CBS contents. Idempotent.
pub fn remove_repeated_atoms(atomization: &mut AtomizationS) {
    let repeated = get_repeated_atoms(atomization);
    atomization.remove_atoms(repeated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cam::Lcs;

    fn atom(vals: &[u64], id: u32) -> AtomS {
        AtomS::new(Ucs(Cbs::from_iter_sorted(vals.iter().copied())), id)
    }

    #[test]
    fn cross_scenario_from_spec() {
        let mut m = AtomizationS::new();
        m.push(atom(&[1], 0));
        m.push(atom(&[2], 1));
        m.push(atom(&[3], 2));
        let l = Cbs::from_iter_sorted([1, 2]);
        let h = Cbs::from_iter_sorted([3]);
        let mut next_id = 3;
        let max_trace = Cbs::new();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        cross(&mut m, &l, &h, 1, &mut next_id, &max_trace, None, TraceErrorPolicy::Warn, &mut rng);

        let mut ucses: Vec<Vec<u64>> = m.atoms.iter().map(|a| a.ucs.iter().collect()).collect();
        ucses.sort();
        assert_eq!(ucses, vec![vec![1, 3], vec![2, 3], vec![3]]);
    }

    #[test]
    fn atom_union_is_asymmetric_in_g() {
        let mut a = atom(&[1], 0);
        a.g = 4;
        let mut b = atom(&[2], 1);
        b.g = 2;
        let mut next_id = 2;
        let u = atom_union(&a, &b, 0, &mut next_id, false);
        assert_eq!(u.g, (a.g + 1).max(b.g));
    }

    #[test]
    fn reduction_is_noop_with_one_atom_per_constant() {
        let mut m = AtomizationS::new();
        let tracer_nt = 2usize;
        let mut a0 = atom(&[0], 0);
        a0.trace = Lcs(Cbs::from_iter_sorted(0..tracer_nt as u64));
        let mut a1 = atom(&[1], 1);
        a1.trace = Lcs(Cbs::from_iter_sorted(0..tracer_nt as u64));
        m.push(a0);
        m.push(a1);

        let constants = Cs::from_cbs(Cbs::from_iter_sorted([0, 1]));
        let stored: HashMap<Constant, Cbs> = constants
            .iter()
            .map(|c| (c, Cbs::from_iter_sorted(0..tracer_nt as u64)))
            .collect();
        let max_trace = Cbs::from_iter_sorted(0..tracer_nt as u64);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);

        reduction_by_traces(&mut m, &constants, &stored, &max_trace, None, TraceErrorPolicy::Warn, &mut rng);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn union_model_update_matches_spec_scenario() {
        let mut m = AtomizationS::new();
        m.push(atom(&[1], 0));
        let l = Lcs(Cbs::from_iter_sorted([1]));
        let h = Lcs(Cbs::from_iter_sorted([2]));
        let duples = vec![Duple::new(l, h, false)];
        let entrance = vec![5u32];
        let last_update = vec![10u32];

        let result = update_union_model_with_set_of_pduples(&m, &duples, &entrance, &last_update);
        assert!(result.deleted.contains(0));
        assert!(!result.keep.contains(0));
    }

    #[test]
    fn remove_repeated_atoms_is_idempotent() {
        let mut m = AtomizationS::new();
        m.push(atom(&[1, 2], 0));
        m.push(atom(&[2, 1], 1));
        m.push(atom(&[3], 2));
        remove_repeated_atoms(&mut m);
        assert_eq!(m.len(), 2);
        remove_repeated_atoms(&mut m);
        assert_eq!(m.len(), 2);
    }

    use rand::SeedableRng;
}
