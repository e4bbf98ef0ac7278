/*
 *
 * SPDX-FileCopyrightText: 2023 Tommaso Fontana
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Seeded hash functions and masking functions.

A table is parameterized by a [`HashFunction`], which maps a 32-bit key and up
to [`MAX_SEEDS`] seeds to a pair of 32-bit hashes, and by a [`MaskFunction`],
which reduces hashes to vertex indices and sums of assigned values to table
indices.

Both are identified on disk by a numeric identifier (see
[`HashFunction::id`] and [`MaskFunction::id`]).

*/

mod mask;
pub use mask::*;

use std::fmt::Display;

/// The maximum number of seeds used by a hash function.
pub const MAX_SEEDS: usize = 4;

/// Seeds for a [`HashFunction`]; unused trailing seeds are zero.
pub type Seeds = [u32; MAX_SEEDS];

/// The seeded hash functions available for table construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum HashFunction {
    /// CRC-32 of the key and of the rotated key with three seeds.
    Crc32Rotate = 1,
    /// Bob Jenkins' 96-bit mix, once per seed.
    #[default]
    Jenkins = 2,
    /// Multiply, rotate and xor with four seeds.
    RotateXor = 3,
    /// Add, subtract and xor with four seeds.
    AddSubXor = 4,
    /// Multiply and xor with two seeds.
    Xor = 5,
}

impl HashFunction {
    /// All available hash functions.
    pub const ALL: [HashFunction; 5] = [
        HashFunction::Crc32Rotate,
        HashFunction::Jenkins,
        HashFunction::RotateXor,
        HashFunction::AddSubXor,
        HashFunction::Xor,
    ];

    /// Returns the on-disk identifier of this hash function.
    #[inline(always)]
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Returns the hash function with given on-disk identifier.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.id() == id)
    }

    /// Returns the number of seeds used by this hash function.
    pub fn num_seeds(self) -> usize {
        match self {
            HashFunction::Crc32Rotate => 3,
            HashFunction::Jenkins => 2,
            HashFunction::RotateXor => 4,
            HashFunction::AddSubXor => 4,
            HashFunction::Xor => 2,
        }
    }

    /// Computes the pair of raw hashes of `key`.
    ///
    /// Seeds beyond [`num_seeds`](HashFunction::num_seeds) are ignored.
    #[inline(always)]
    pub fn hash(self, key: u32, seeds: &Seeds) -> [u32; 2] {
        match self {
            HashFunction::Crc32Rotate => crc32_rotate(key, seeds),
            HashFunction::Jenkins => [jenkins(key, seeds[0]), jenkins(key, seeds[1])],
            HashFunction::RotateXor => rotate_xor(key, seeds),
            HashFunction::AddSubXor => add_sub_xor(key, seeds),
            HashFunction::Xor => xor(key, seeds),
        }
    }
}

impl Display for HashFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HashFunction::Crc32Rotate => "Crc32Rotate",
            HashFunction::Jenkins => "Jenkins",
            HashFunction::RotateXor => "RotateXor",
            HashFunction::AddSubXor => "AddSubXor",
            HashFunction::Xor => "Xor",
        };
        f.write_str(name)
    }
}

#[inline(always)]
fn crc32(state: u32, value: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(state);
    hasher.update(&value.to_le_bytes());
    hasher.finalize()
}

#[inline(always)]
fn crc32_rotate(key: u32, seeds: &Seeds) -> [u32; 2] {
    let a = crc32(seeds[0], key);
    let b = crc32(seeds[1], key.rotate_left(15));
    let c = seeds[2] ^ key;
    [a, crc32(b, c)]
}

/// The 96-bit mix of Bob Jenkins' `lookup2`, applied to a single word.
#[inline(always)]
fn jenkins(key: u32, seed: u32) -> u32 {
    let mut a: u32 = 0x9e3779b9_u32.wrapping_add(key);
    let mut b: u32 = 0x9e3779b9;
    let mut c: u32 = seed;

    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 13);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 8);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 13);
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 12);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 16);
    c = c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 5);
    a = a.wrapping_sub(b).wrapping_sub(c) ^ (c >> 3);
    b = b.wrapping_sub(c).wrapping_sub(a) ^ (a << 10);
    c.wrapping_sub(a).wrapping_sub(b) ^ (b >> 15)
}

#[inline(always)]
fn rotate_xor(key: u32, seeds: &Seeds) -> [u32; 2] {
    let a = (key ^ seeds[0]).wrapping_mul(0x9e3779b1);
    let b = (key ^ seeds[1]).wrapping_mul(0x85ebca6b);
    [
        a ^ a.rotate_right(15) ^ seeds[2],
        b ^ b.rotate_right(13) ^ seeds[3],
    ]
}

#[inline(always)]
fn add_sub_xor(key: u32, seeds: &Seeds) -> [u32; 2] {
    let a = key.wrapping_add(seeds[0]).wrapping_mul(0xcc9e2d51);
    let b = key.wrapping_sub(seeds[1]).wrapping_mul(0x1b873593);
    [
        (a ^ (a >> 16)).wrapping_sub(seeds[2]),
        (b ^ (b >> 16)).wrapping_add(seeds[3]),
    ]
}

#[inline(always)]
fn xor(key: u32, seeds: &Seeds) -> [u32; 2] {
    // The final multiply keeps folding from undoing the first xor-shift
    let mut a = (key ^ seeds[0]).wrapping_mul(0x9e3779b1);
    a = (a ^ (a >> 16)).wrapping_mul(0x85ebca6b);
    let mut b = (key ^ seeds[1]).wrapping_mul(0xcc9e2d51);
    b = (b ^ (b >> 15)).wrapping_mul(0x2c1b3c6d);
    [a ^ (a >> 13), b ^ (b >> 12)]
}
