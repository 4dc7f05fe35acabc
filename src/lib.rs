/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Computational core of an Algebraic Machine Learning engine:
//! compressed bit-sets, trace computation, and the crossing/reduction
//! algorithm that refines an atomization against a stream of duples.
//!
//! The outer driver loop, model serialization framing, parameter
//! parsing, and the surrounding learning orchestration are deliberately
//! out of scope — see `SPEC_FULL.md` for the full boundary.

#![deny(unstable_features)]
#![deny(trivial_casts)]
#![deny(unconditional_recursion)]
#![deny(clippy::empty_loop)]
#![deny(unreachable_code)]
#![deny(unreachable_pub)]
#![deny(unreachable_patterns)]
#![deny(unused_macro_rules)]
#![deny(unused_doc_comments)]
#![allow(clippy::type_complexity)]

pub mod cam;
pub mod cbs;
pub mod cross;
pub mod error;
#[cfg(feature = "fuzz")]
pub mod fuzz;
pub mod rng;
pub mod serialize;
pub mod sm;
pub mod trace;

pub mod prelude {
    pub use crate::cam::*;
    pub use crate::cbs::{Cbs, CbsHashSet};
    pub use crate::cross::*;
    pub use crate::error::*;
    pub use crate::rng::WorkerRng;
    pub use crate::serialize::*;
    pub use crate::sm::Sm;
    pub use crate::trace::*;
}
