/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Content-addressed set of CBS values, used only to detect duplicate
//! atoms.
//!
//! Grounded in `cbar.h`'s `hashMap` (a 64-slot node with an occupancy
//! bitmap, `hashMap_map_masked`/`hashMap_get_masked` keyed by CBS
//! content) and `cbar.c`'s `get_repeated_atoms` /
//! `Atomization_s_remove_atoms`. Each node has 64 slots; a slot holds
//! either nothing, a single leaf CBS, or (on collision) a boxed child
//! node keyed by the next 6 bits of a re-perturbed hash, mirroring the
//! "seed is perturbed per depth to avoid pathological nesting" design
//! note in `spec.md` §4.3.

use super::Cbs;

const FANOUT: usize = 64;

enum Slot {
    Empty,
    Leaf(Cbs),
    Node(Box<Node>),
}

struct Node {
    slots: Vec<Slot>,
    seed: u32,
}

impl Node {
    fn new(seed: u32) -> Self {
        let mut slots = Vec::with_capacity(FANOUT);
        for _ in 0..FANOUT {
            slots.push(Slot::Empty);
        }
        Self { slots, seed }
    }
}

/// A 64-way trie of CBS values keyed by a Jenkins-style hash over their
/// content-masked bytes (the canonical re-encoded body; the spec's
/// "capacity bytes" do not exist in this representation since `Cbs`
/// does not serialize its allocation slack into comparable content).
pub struct CbsHashSet {
    root: Node,
}

impl Default for CbsHashSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CbsHashSet {
    pub fn new() -> Self {
        Self { root: Node::new(0x9e37_79b9) }
    }

    pub fn contains(&self, cbs: &Cbs) -> bool {
        Self::lookup(&self.root, cbs, jenkins_hash(cbs.content_bytes(), self.root.seed))
    }

    fn lookup(node: &Node, cbs: &Cbs, hash: u32) -> bool {
        let idx = (hash as usize) % FANOUT;
        match &node.slots[idx] {
            Slot::Empty => false,
            Slot::Leaf(existing) => content_masked_eq(existing, cbs),
            Slot::Node(child) => {
                let next_hash = jenkins_hash(cbs.content_bytes(), child.seed);
                Self::lookup(child, cbs, next_hash)
            }
        }
    }

    /// Inserts `cbs`. Does nothing if an equal value is already present.
    pub fn add(&mut self, cbs: Cbs) {
        let hash = jenkins_hash(cbs.content_bytes(), self.root.seed);
        Self::insert(&mut self.root, cbs, hash);
    }

    fn insert(node: &mut Node, cbs: Cbs, hash: u32) {
        let idx = (hash as usize) % FANOUT;
        match &mut node.slots[idx] {
            Slot::Empty => {
                node.slots[idx] = Slot::Leaf(cbs);
            }
            Slot::Leaf(existing) => {
                if content_masked_eq(existing, &cbs) {
                    return;
                }
                let mut child = Node::new(node.seed.wrapping_mul(0x01000193).wrapping_add(1));
                let existing_owned = std::mem::replace(&mut node.slots[idx], Slot::Empty);
                if let Slot::Leaf(existing_cbs) = existing_owned {
                    let h = jenkins_hash(existing_cbs.content_bytes(), child.seed);
                    Self::insert(&mut child, existing_cbs, h);
                }
                let h = jenkins_hash(cbs.content_bytes(), child.seed);
                Self::insert(&mut child, cbs, h);
                node.slots[idx] = Slot::Node(Box::new(child));
            }
            Slot::Node(child) => {
                let next_hash = jenkins_hash(cbs.content_bytes(), child.seed);
                Self::insert(child, cbs, next_hash);
            }
        }
    }
}

fn content_masked_eq(a: &Cbs, b: &Cbs) -> bool {
    a.content_bytes() == b.content_bytes()
}

/// A one-at-a-time Jenkins hash, perturbed by `seed` so that nested
/// trie levels do not collide on the same bit patterns.
pub fn jenkins_hash(bytes: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    for &b in bytes {
        hash = hash.wrapping_add(b as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbs::Cbs;

    #[test]
    fn detects_equal_content_as_duplicate() {
        let mut set = CbsHashSet::new();
        let mut a = Cbs::new();
        a.add_bit(3);
        a.add_bit(9);
        let mut b = Cbs::new();
        b.add_bit(9);
        b.add_bit(3);
        assert!(!set.contains(&a));
        set.add(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn distinguishes_different_content() {
        let mut set = CbsHashSet::new();
        let mut a = Cbs::new();
        a.add_bit(3);
        let mut b = Cbs::new();
        b.add_bit(4);
        set.add(a);
        assert!(!set.contains(&b));
    }

    #[test]
    fn handles_many_collisions_via_subtrie() {
        let mut set = CbsHashSet::new();
        let mut cbses = Vec::new();
        for i in 0..2000u64 {
            let mut c = Cbs::new();
            c.add_bit(i);
            cbses.push(c);
        }
        for c in &cbses {
            set.add(c.clone());
        }
        for c in &cbses {
            assert!(set.contains(c));
        }
    }
}
