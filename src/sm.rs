/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Segment manager: the allocator backing compressed bit-set bodies.
//!
//! Grounded in `cbar.h`'s `unboundedAllocator`/`generalCbarManager` pair
//! and their `omp_lock_t`-guarded counters. Rust's global allocator
//! already does the arena work the C allocator hand-rolls, so `Sm` is
//! reduced to its observable contract: acquire zero-initialized bodies,
//! track outstanding allocations under a single mutex, and assert all
//! bodies were returned when a caller expects a clean shutdown.

use std::sync::Mutex;

/// Allocator for CBS bodies. The only lock-protected object in the
/// core: every other shared structure is either read-mostly or
/// partitioned across disjoint index ranges for parallel access.
#[derive(Debug, Default)]
pub struct Sm {
    inner: Mutex<SmInner>,
}

#[derive(Debug, Default)]
struct SmInner {
    outstanding: u32,
    total_allocations: u64,
}

impl Sm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a zero-initialized body of `nbytes`. Concurrency-safe:
    /// multiple workers may call this at once.
    pub fn acquire(&self, nbytes: usize) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        inner.outstanding += 1;
        inner.total_allocations += 1;
        vec![0u8; nbytes]
    }

    /// Release a previously acquired body. Idempotent on `None`.
    pub fn release(&self, body: Option<Vec<u8>>) {
        if body.is_none() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.outstanding = inner
            .outstanding
            .checked_sub(1)
            .expect("release called more times than acquire");
    }

    pub fn outstanding(&self) -> u32 {
        self.inner.lock().unwrap().outstanding
    }

    pub fn all_returned(&self) -> bool {
        self.outstanding() == 0
    }

    pub fn total_allocations(&self) -> u64 {
        self.inner.lock().unwrap().total_allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_zeroes_and_counts() {
        let sm = Sm::new();
        let body = sm.acquire(16);
        assert_eq!(body.len(), 16);
        assert!(body.iter().all(|&b| b == 0));
        assert_eq!(sm.outstanding(), 1);
        assert!(!sm.all_returned());
        sm.release(Some(body));
        assert!(sm.all_returned());
    }

    #[test]
    fn release_none_is_idempotent() {
        let sm = Sm::new();
        sm.release(None);
        sm.release(None);
        assert!(sm.all_returned());
    }

    #[test]
    #[should_panic]
    fn release_past_zero_panics() {
        let sm = Sm::new();
        sm.release(Some(vec![]));
    }
}
