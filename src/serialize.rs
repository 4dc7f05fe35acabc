/*
 * SPDX-FileCopyrightText: 2025 Algebraic AI contributors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External interface: binary serialization of a CBS batch
//! (`spec.md` §6).
//!
//! ```text
//! u32  count
//! for each of count CBSs:
//!     u64 size_in_bytes
//!     raw bytes of the CBS body (size_in_bytes, includes header)
//! ```
//!
//! `count == 0` is legal. A CBS with `size == 0` is written with no
//! body and reads back as the null/empty body.
//!
//! This is the one place in the crate where malformed input is caller
//! data rather than a programming error, so it returns
//! [`AmlResult`](crate::error::AmlResult) instead of panicking.

use std::io::{Read, Write};

use anyhow::Context;

use crate::cbs::Cbs;
use crate::error::{AmlError, AmlResult};

/// Writes a batch of CBS values in the format above.
pub fn serialize_batch<W: Write>(batch: &[Cbs], mut out: W) -> anyhow::Result<()> {
    let count: u32 = batch.len().try_into().context("batch count exceeds u32::MAX")?;
    out.write_all(&count.to_le_bytes()).context("writing batch count")?;
    for cbs in batch {
        let bytes = cbs.as_bytes();
        let size = bytes.len() as u64;
        out.write_all(&size.to_le_bytes()).context("writing CBS size")?;
        out.write_all(bytes).context("writing CBS body")?;
    }
    Ok(())
}

/// Reads a batch of CBS values. A size that cannot plausibly be a CBS
/// body (the read is truncated mid-body) is a corrupted-container
/// error; anything the CBS decoder itself rejects propagates as a
/// panic from [`Cbs::from_bytes`], per the "malformed token is fatal"
/// policy.
pub fn deserialize_batch<R: Read>(mut input: R) -> AmlResult<Vec<Cbs>> {
    let mut count_buf = [0u8; 4];
    input
        .read_exact(&mut count_buf)
        .map_err(|e| AmlError::CorruptedContainer(format!("reading batch count: {e}")))?;
    let count = u32::from_le_bytes(count_buf) as usize;

    let mut batch = Vec::with_capacity(count);
    for _ in 0..count {
        let mut size_buf = [0u8; 8];
        input
            .read_exact(&mut size_buf)
            .map_err(|e| AmlError::CorruptedContainer(format!("reading CBS size: {e}")))?;
        let size = u64::from_le_bytes(size_buf) as usize;

        if size == 0 {
            batch.push(Cbs::new());
            continue;
        }

        let mut body = vec![0u8; size];
        input
            .read_exact(&mut body)
            .map_err(|e| AmlError::CorruptedContainer(format!("reading CBS body: {e}")))?;
        batch.push(Cbs::from_bytes(&body));
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_sets() {
        let batch = vec![
            Cbs::from_iter_sorted([1, 2, 3]),
            Cbs::new(),
            Cbs::from_iter_sorted([1000, 2000, 3000]),
        ];
        let mut buf = Vec::new();
        serialize_batch(&batch, &mut buf).unwrap();
        let decoded = deserialize_batch(&buf[..]).unwrap();
        assert_eq!(decoded.len(), batch.len());
        for (a, b) in batch.iter().zip(decoded.iter()) {
            assert!(Cbs::equal(a, b));
        }
    }

    #[test]
    fn empty_batch_is_legal() {
        let mut buf = Vec::new();
        serialize_batch(&[], &mut buf).unwrap();
        let decoded = deserialize_batch(&buf[..]).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn truncated_input_is_corrupted_container_error() {
        let buf = vec![1, 0, 0, 0]; // count = 1, but no size/body follows
        let result = deserialize_batch(&buf[..]);
        assert!(matches!(result, Err(AmlError::CorruptedContainer(_))));
    }
}
