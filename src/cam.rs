/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Constant/Atom model: the plain records the rest of the engine
//! operates on.
//!
//! Grounded in `aml_fast.h`/`aml_fast.c`'s `Atom_s`, `Atomization_s`,
//! and the Tracer/Duple structures threaded through `crossAll` and
//! `atomization_product`.

use impl_tools::autoimpl;

use crate::cbs::Cbs;

/// An integer index into the constant universe `[0, C)`.
pub type Constant = u64;

/// Immutable snapshot of a finite constant set: the CBS plus its
/// materialized sorted array, for O(log n) membership queries.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Cs {
    cbs: Cbs,
    sorted: Vec<Constant>,
}

impl Cs {
    pub fn from_cbs(cbs: Cbs) -> Self {
        let sorted = cbs.iter().collect();
        Self { cbs, sorted }
    }

    pub fn cbs(&self) -> &Cbs {
        &self.cbs
    }

    pub fn contains(&self, c: Constant) -> bool {
        self.sorted.binary_search(&c).is_ok()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Constant> + '_ {
        self.sorted.iter().copied()
    }
}

/// A constant-set tagged as the upper pole of a duple/atom.
#[autoimpl(Deref using self.0)]
#[autoimpl(DerefMut using self.0)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Ucs(pub Cbs);

/// A constant-set tagged as the lower pole of a duple, or an
/// indicator's filter set.
#[autoimpl(Deref using self.0)]
#[autoimpl(DerefMut using self.0)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Lcs(pub Cbs);

impl From<Cbs> for Ucs {
    fn from(cbs: Cbs) -> Self {
        Self(cbs)
    }
}

impl From<Cbs> for Lcs {
    fn from(cbs: Cbs) -> Self {
        Self(cbs)
    }
}

/// A mutable atom: an unordered constant-set paired with its trace.
///
/// `id` is a process-wide monotonically increasing identifier used by
/// the [`TraceHelper`](crate::trace::TraceHelper) cache to survive
/// reorderings of the atomization.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct AtomS {
    pub ucs: Ucs,
    pub trace: Lcs,
    pub epoch: u32,
    /// Generation bound. `atom_union` advances this asymmetrically:
    /// `max(a.g + 1, b.g)`. See `spec.md` §9.
    pub g: u32,
    pub gen: u32,
    pub id: u32,
}

impl AtomS {
    pub fn new(ucs: Ucs, id: u32) -> Self {
        Self { ucs, trace: Lcs::default(), epoch: 0, g: 0, gen: 0, id }
    }
}

/// An ordered sequence of atoms. Intended sorted by `id` ascending
/// whenever a [`TraceHelper`](crate::trace::TraceHelper) is in use.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct AtomizationS {
    pub atoms: Vec<AtomS>,
}

impl AtomizationS {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn push(&mut self, atom: AtomS) {
        self.atoms.push(atom);
    }

    /// Sorts the atomization by atom ID ascending. `TraceHelper::update`
    /// requires this and sorts first itself if it finds the invariant
    /// broken.
    pub fn sort_by_id(&mut self) {
        self.atoms.sort_by_key(|a| a.id);
    }

    pub fn is_sorted_by_id(&self) -> bool {
        self.atoms.windows(2).all(|w| w[0].id <= w[1].id)
    }

    /// Removes the atoms at the given indices (ascending, unique),
    /// releasing their CBS contents. Returns the removed atoms.
    pub fn remove_atoms(&mut self, mut indices: Vec<usize>) -> Vec<AtomS> {
        indices.sort_unstable();
        indices.dedup();
        let mut removed = Vec::with_capacity(indices.len());
        for &idx in indices.iter().rev() {
            removed.push(self.atoms.remove(idx));
        }
        removed.reverse();
        removed
    }

    pub fn ids(&self) -> Vec<u32> {
        self.atoms.iter().map(|a| a.id).collect()
    }
}

/// Two parallel arrays of LCS: the positive indicator pole
/// (`indicators`) and the negative atom-indicator pole
/// (`atom_indicators`). Indicator slot indices run in `[0, Nt)`, with
/// atom-indicator `k` occupying slot `Ni + k`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    pub indicators: Vec<Lcs>,
    pub atom_indicators: Vec<Lcs>,
}

impl Tracer {
    pub fn ni(&self) -> usize {
        self.indicators.len()
    }

    pub fn nai(&self) -> usize {
        self.atom_indicators.len()
    }

    pub fn nt(&self) -> usize {
        self.ni() + self.nai()
    }

    /// The filter set for indicator slot `k`, whichever pole it lives
    /// in.
    pub fn slot(&self, k: usize) -> &Lcs {
        if k < self.ni() {
            &self.indicators[k]
        } else {
            &self.atom_indicators[k - self.ni()]
        }
    }

    /// `true` if slot `k` is a negative (atom-indicator) slot.
    pub fn is_negative(&self, k: usize) -> bool {
        k >= self.ni()
    }
}

/// `(L, H, hyp)`: a constraint `L ⊑ H` (positive) or `L ⋢ H` (negative).
/// `hyp` marks hypotheses, which are not stored in result sets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Duple {
    pub l: Lcs,
    pub h: Lcs,
    pub hyp: bool,
}

impl Duple {
    pub fn new(l: Lcs, h: Lcs, hyp: bool) -> Self {
        Self { l, h, hyp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cs_binary_search_membership() {
        let cbs = Cbs::from_iter_sorted([3, 7, 42]);
        let cs = Cs::from_cbs(cbs);
        assert!(cs.contains(7));
        assert!(!cs.contains(8));
        assert_eq!(cs.len(), 3);
    }

    #[test]
    fn atomization_remove_preserves_order() {
        let mut m = AtomizationS::new();
        for i in 0..5u32 {
            m.push(AtomS::new(Ucs(Cbs::from_iter_sorted([i as u64])), i));
        }
        let removed = m.remove_atoms(vec![1, 3]);
        assert_eq!(removed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(m.ids(), vec![0, 2, 4]);
    }

    #[test]
    fn tracer_slot_resolves_both_poles() {
        let tracer = Tracer {
            indicators: vec![Lcs(Cbs::from_iter_sorted([0, 1]))],
            atom_indicators: vec![Lcs(Cbs::from_iter_sorted([3]))],
        };
        assert_eq!(tracer.nt(), 2);
        assert!(!tracer.is_negative(0));
        assert!(tracer.is_negative(1));
    }
}
