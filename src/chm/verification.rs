/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::BuildError;
use crate::bits::BitVec;
use crate::table::{index_in, TableInfoOnDisk};

/// Checks that an assignment array maps the given keys to distinct indices.
///
/// Only the header and the assignment array are used, exactly as in a query,
/// so this check is independent from the construction. The key found at each
/// index is recorded, so that a collision reports both keys involved.
pub fn verify(header: &TableInfoOnDisk, data: &[u32], keys: &[u32]) -> Result<(), BuildError> {
    if header.num_keys != keys.len() as u64 {
        return Err(BuildError::KeyCountMismatch {
            expected: header.num_keys,
            found: keys.len(),
        });
    }

    let index_size = header.index_size as usize;
    let mut seen = BitVec::new(index_size);
    let mut values = vec![0_u32; index_size];

    for &key in keys {
        let index = index_in(header, data, key)
            .map_err(|source| BuildError::IndexFailure { key, source })?;
        let slot = index as usize;
        if slot >= index_size {
            return Err(BuildError::IndexOutOfRange { key, index });
        }
        if seen.test_and_set(slot) {
            return Err(BuildError::IndexCollision {
                key,
                previous_key: values[slot],
                index,
            });
        }
        values[slot] = key;
    }

    debug_assert_eq!(seen.count_ones(), keys.len());
    Ok(())
}
