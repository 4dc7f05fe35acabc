/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Structured fuzzing harness for the CBS codec, gated behind the
//! `fuzz` feature.
//!
//! Grounded in the teacher's own `src/fuzz/bvcomp_and_read.rs`: a
//! `FuzzCase` built via `#[derive(Arbitrary)]`, consumed by a `harness`
//! function that the `fuzz/` crate's `fuzz_targets/` binaries call
//! directly (`webgraph::fuzz::bvcomp_and_read::{FuzzCase, harness}`
//! there, `aml_core::fuzz::{FuzzCase, harness}` here). The CBS codec is
//! the same shape of problem as the teacher's bit-stream codecs (a
//! hand-rolled binary format that must round-trip and must never panic
//! outside the documented "malformed token is fatal" policy), so it
//! gets the same treatment: replay a sequence of commands against the
//! real [`Cbs`](crate::cbs::Cbs) and a reference [`BTreeSet`], and
//! assert they never disagree.

use std::collections::BTreeSet;

use arbitrary::Arbitrary;

use crate::cbs::Cbs;

/// One step of a fuzz case: either a mutation applied to both the real
/// `Cbs` and the reference set, or a read-only check that their
/// observable behavior still agrees.
#[derive(Arbitrary, Debug)]
pub enum RandomCommand {
    Add(u16),
    Remove(u16),
    Contains(u16),
    UnionWithOther,
    IntersectWithOther,
    SubtractOther,
    Cardinality,
    CloneFromOther,
}

/// A sequence of commands run against a pair of sets (`a`, the one
/// under mutation, and `b`, a second independently-seeded set used as
/// the right-hand operand for binary ops).
#[derive(Arbitrary, Debug)]
pub struct FuzzCase {
    pub init_a: Vec<u16>,
    pub init_b: Vec<u16>,
    pub commands: Vec<RandomCommand>,
}

fn build(elems: &[u16]) -> (Cbs, BTreeSet<u64>) {
    let mut cbs = Cbs::new();
    let mut reference = BTreeSet::new();
    for &e in elems {
        cbs.add_bit(e as u64);
        reference.insert(e as u64);
    }
    (cbs, reference)
}

fn assert_same(cbs: &Cbs, reference: &BTreeSet<u64>) {
    let decoded: Vec<u64> = cbs.iter().collect();
    let expected: Vec<u64> = reference.iter().copied().collect();
    assert_eq!(decoded, expected, "Cbs content diverged from the reference BTreeSet");
    assert_eq!(cbs.cardinality(), expected.len() as u64);
}

/// Replays `data.commands` against a real `Cbs` and a `BTreeSet`
/// reference, asserting at every step that the two never disagree on
/// membership, cardinality, or iteration order.
pub fn harness(data: FuzzCase) {
    let (mut a, mut ref_a) = build(&data.init_a);
    let (b, ref_b) = build(&data.init_b);
    assert_same(&a, &ref_a);
    assert_same(&b, &ref_b);

    for command in data.commands {
        match command {
            RandomCommand::Add(v) => {
                let v = v as u64;
                let changed = a.add_bit(v);
                assert_eq!(changed, ref_a.insert(v));
            }
            RandomCommand::Remove(v) => {
                let v = v as u64;
                let changed = a.remove_bit(v);
                assert_eq!(changed, ref_a.remove(&v));
            }
            RandomCommand::Contains(v) => {
                let v = v as u64;
                assert_eq!(a.contains(v), ref_a.contains(&v));
            }
            RandomCommand::UnionWithOther => {
                Cbs::union_into(&mut a, &b);
                ref_a.extend(ref_b.iter().copied());
            }
            RandomCommand::IntersectWithOther => {
                Cbs::intersect_into(&mut a, &b);
                ref_a.retain(|v| ref_b.contains(v));
            }
            RandomCommand::SubtractOther => {
                Cbs::subtract_into(&mut a, &b);
                ref_a.retain(|v| !ref_b.contains(v));
            }
            RandomCommand::Cardinality => {
                assert_eq!(a.cardinality(), ref_a.len() as u64);
            }
            RandomCommand::CloneFromOther => {
                Cbs::clone_into(&mut a, &b);
                ref_a = ref_b.clone();
            }
        }
        assert_same(&a, &ref_a);
    }
}
