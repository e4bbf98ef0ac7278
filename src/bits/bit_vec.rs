/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Fixed-capacity bit vectors.

A [`BitVec`] is used during construction to keep track of deleted edges,
visited and assigned vertices, and of the indices already produced by a
candidate solution. The backend is a vector of words; the length is fixed at
construction time and all accessors check bounds.

*/

use epserde::prelude::*;
use mem_dbg::*;
use std::ops::Index;

/// A fixed-length bit vector backed by 64-bit words.
#[derive(Epserde, Debug, Clone, MemDbg, MemSize)]
pub struct BitVec {
    data: Vec<u64>,
    len: usize,
}

macro_rules! panic_if_out_of_bounds {
    ($index: expr, $len: expr) => {
        if $index >= $len {
            panic!("Bit index out of bounds: {} >= {}", $index, $len)
        }
    };
}

const BITS: usize = u64::BITS as usize;

impl BitVec {
    /// Creates a new zeroed bit vector of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len.div_ceil(BITS)],
            len,
        }
    }

    /// Creates a new zeroed bit vector of length `len`, reporting allocation
    /// failures instead of aborting.
    pub fn try_new(len: usize) -> Result<Self, std::collections::TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(len.div_ceil(BITS))?;
        data.resize(len.div_ceil(BITS), 0);
        Ok(Self { data, len })
    }

    /// Returns the number of bits in this bit vector.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the value of the bit of given index.
    #[inline(always)]
    pub fn get(&self, index: usize) -> bool {
        panic_if_out_of_bounds!(index, self.len);
        (self.data[index / BITS] >> (index % BITS)) & 1 != 0
    }

    /// Returns the number of bits set to one.
    pub fn count_ones(&self) -> usize {
        self.data.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns an iterator over the indices of the bits set to one.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.data
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let mut word = word;
                std::iter::from_fn(move || {
                    if word == 0 {
                        None
                    } else {
                        let bit = word.trailing_zeros() as usize;
                        word &= word - 1;
                        Some(word_index * BITS + bit)
                    }
                })
            })
    }

    /// Sets the bit of given index to `value`.
    #[inline(always)]
    pub fn set(&mut self, index: usize, value: bool) {
        panic_if_out_of_bounds!(index, self.len);
        let word = &mut self.data[index / BITS];
        let mask = 1 << (index % BITS);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// Clears the bit of given index.
    #[inline(always)]
    pub fn clear(&mut self, index: usize) {
        self.set(index, false);
    }

    /// Sets the bit of given index, returning its previous value.
    #[inline(always)]
    pub fn test_and_set(&mut self, index: usize) -> bool {
        panic_if_out_of_bounds!(index, self.len);
        let word = &mut self.data[index / BITS];
        let mask = 1 << (index % BITS);
        let old = *word & mask != 0;
        *word |= mask;
        old
    }

    /// Sets all bits to `value`.
    pub fn fill(&mut self, value: bool) {
        let word = if value { !0 } else { 0 };
        self.data.iter_mut().for_each(|w| *w = word);
        // Unused bits of the last word must stay zero
        let residual = self.len % BITS;
        if value && residual != 0 {
            if let Some(last) = self.data.last_mut() {
                *last = (1 << residual) - 1;
            }
        }
    }

    /// Clears all bits.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.fill(false);
    }
}

impl Index<usize> for BitVec {
    type Output = bool;

    fn index(&self, index: usize) -> &Self::Output {
        match self.get(index) {
            false => &false,
            true => &true,
        }
    }
}
