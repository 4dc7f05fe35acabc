/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Error kinds surfaced across the crate's external boundary.
//!
//! Internal invariant failures (corrupted containers, contract
//! violations) are not recoverable and are reported by panicking with a
//! message built from [`AmlError`]'s `Display` impl rather than by
//! returning a `Result`, matching the propagation rule that the core has
//! no recoverable errors. Only the two operations that consume
//! caller-supplied data at the external boundary — batch deserialization
//! and indicator selection over a possibly-inconsistent duple set —
//! return `Result<_, AmlError>`.

use thiserror::Error;

/// The five error kinds named by the error handling design.
#[derive(Debug, Error)]
pub enum AmlError {
    /// A CBS token stream is malformed (bad token tag, truncated run,
    /// zero-length literal run, or an empty run that would run past the
    /// declared body length).
    #[error("corrupted CBS container: {0}")]
    CorruptedContainer(String),

    /// A precondition was violated by the caller: a non-null CBS where
    /// null was required, a non-empty trace where empty was required,
    /// an empty discriminant passed to `cross`.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// An indicator's inverse-trace set (`tD[e]`) was empty when the
    /// algorithm needed a candidate atom from it.
    #[error("trace error: tD[{indicator}] is empty in {operation}")]
    TraceError { indicator: usize, operation: &'static str },

    /// `select_all_useful_indicators` found a non-hypothetical duple
    /// with no useful indicator at all.
    #[error("inconsistent input: duple {duple_index} has no useful indicator")]
    InconsistentInput { duple_index: usize },

    /// The segment manager could not satisfy an allocation, or a
    /// computed length exceeds the header's bound.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
}

pub type AmlResult<T> = Result<T, AmlError>;

/// Policy for handling a [`AmlError::TraceError`] (`tD[e]` empty).
///
/// Default policy (`Warn`) logs the condition and has the caller skip
/// the offending indicator, matching `IGNORE_ERROR_B`'s default-on
/// behavior in `reduction_by_traces`. `Abort` panics immediately.
///
/// `atomization_product`'s own warn branch is intentionally routed
/// through the same enum rather than reproducing the source's
/// inconsistency between it and `reduction_by_traces` — see
/// `DESIGN.md` for the resolution of that open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceErrorPolicy {
    Warn,
    Abort,
}

impl TraceErrorPolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            TraceErrorPolicy::Abort
        } else {
            TraceErrorPolicy::Warn
        }
    }

    /// Handle a trace error per policy. Returns `true` if the caller
    /// should skip the offending indicator and continue; panics under
    /// `Abort`.
    pub fn handle(self, indicator: usize, operation: &'static str) -> bool {
        match self {
            TraceErrorPolicy::Warn => {
                log::warn!("tD[{indicator}] empty in {operation}, skipping indicator");
                true
            }
            TraceErrorPolicy::Abort => {
                panic!("{}", AmlError::TraceError { indicator, operation });
            }
        }
    }
}
