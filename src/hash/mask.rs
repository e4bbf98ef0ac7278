/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::fmt::Display;

/// The masking functions reducing hashes to vertices and sums of assigned
/// values to table indices.
///
/// All masking functions but [`MaskFunction::Modulus`] require power-of-two
/// table sizes. Folding applies only to hashes: since the index of a key is
/// the masked sum of two assigned values, the index is always reduced with a
/// plain AND mask (or with a modulus, for [`MaskFunction::Modulus`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MaskFunction {
    /// Reduction modulo the table size.
    Modulus = 1,
    /// AND with a power-of-two mask.
    #[default]
    And = 2,
    /// Xor of the hash with itself shifted right by the table size
    /// exponent, then AND.
    XorAnd = 3,
    /// Pick a fold count based on the table size exponent.
    FoldAuto = 4,
    /// Fold the upper half on the lower half, then AND.
    FoldOnce = 5,
    /// Fold twice (to 8 bits), then AND.
    FoldTwice = 6,
    /// Fold thrice (to 4 bits), then AND.
    FoldThrice = 7,
}

impl MaskFunction {
    /// All available mask functions.
    pub const ALL: [MaskFunction; 7] = [
        MaskFunction::Modulus,
        MaskFunction::And,
        MaskFunction::XorAnd,
        MaskFunction::FoldAuto,
        MaskFunction::FoldOnce,
        MaskFunction::FoldTwice,
        MaskFunction::FoldThrice,
    ];

    /// Returns the on-disk identifier of this mask function.
    #[inline(always)]
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Returns the mask function with given on-disk identifier.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }

    /// Returns whether this masking function uses modular reduction, and thus
    /// does not require power-of-two table sizes.
    #[inline(always)]
    pub fn is_modulus(self) -> bool {
        self == MaskFunction::Modulus
    }

    /// Resolves [`MaskFunction::FoldAuto`] to a concrete mask function given
    /// the base-2 logarithm of the hash size; other functions are returned
    /// unchanged.
    pub fn resolve(self, hash_shift: u32) -> Self {
        match self {
            MaskFunction::FoldAuto => match hash_shift {
                0..=4 => MaskFunction::FoldThrice,
                5..=8 => MaskFunction::FoldTwice,
                9..=16 => MaskFunction::FoldOnce,
                _ => MaskFunction::And,
            },
            other => other,
        }
    }

    /// Returns the number of folds performed on hashes.
    pub fn fold(self) -> u32 {
        match self {
            MaskFunction::FoldOnce => 1,
            MaskFunction::FoldTwice => 2,
            MaskFunction::FoldThrice => 3,
            _ => 0,
        }
    }
}

impl Display for MaskFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MaskFunction::Modulus => "Modulus",
            MaskFunction::And => "And",
            MaskFunction::XorAnd => "XorAnd",
            MaskFunction::FoldAuto => "FoldAuto",
            MaskFunction::FoldOnce => "FoldOnce",
            MaskFunction::FoldTwice => "FoldTwice",
            MaskFunction::FoldThrice => "FoldThrice",
        };
        f.write_str(name)
    }
}

/// A resolved masking function together with the table parameters it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Masking {
    function: MaskFunction,
    hash_shift: u32,
    hash_mask: u32,
    hash_modulus: u32,
    index_mask: u32,
    index_modulus: u32,
}

impl Masking {
    /// Creates a new masking for a hash space of `hash_size` elements and an
    /// index space of `index_size` elements.
    ///
    /// [`MaskFunction::FoldAuto`] is resolved here. Both sizes must be powers
    /// of two unless `function` is [`MaskFunction::Modulus`].
    pub fn new(function: MaskFunction, hash_size: u32, index_size: u32) -> Self {
        debug_assert!(hash_size > 0 && index_size > 0);
        debug_assert!(
            function.is_modulus() || (hash_size.is_power_of_two() && index_size.is_power_of_two())
        );
        let hash_shift = hash_size.trailing_zeros();
        Self {
            function: function.resolve(hash_shift),
            hash_shift,
            hash_mask: hash_size.wrapping_sub(1),
            hash_modulus: hash_size,
            index_mask: index_size.wrapping_sub(1),
            index_modulus: index_size,
        }
    }

    /// Rebuilds a masking from raw table parameters, as stored in a table
    /// header. The function must be already resolved.
    pub(crate) fn from_parts(
        function: MaskFunction,
        hash_shift: u32,
        hash_mask: u32,
        hash_modulus: u32,
        index_mask: u32,
        index_modulus: u32,
    ) -> Self {
        Self {
            function,
            hash_shift,
            hash_mask,
            hash_modulus,
            index_mask,
            index_modulus,
        }
    }

    /// Returns the resolved mask function.
    #[inline(always)]
    pub fn function(&self) -> MaskFunction {
        self.function
    }

    #[inline(always)]
    pub fn hash_mask(&self) -> u32 {
        self.hash_mask
    }

    #[inline(always)]
    pub fn index_mask(&self) -> u32 {
        self.index_mask
    }

    /// Reduces a raw hash to a vertex.
    #[inline(always)]
    pub fn mask_hash(&self, hash: u32) -> u32 {
        match self.function {
            MaskFunction::Modulus => hash % self.hash_modulus,
            MaskFunction::And | MaskFunction::FoldAuto => hash & self.hash_mask,
            MaskFunction::XorAnd => (hash ^ (hash >> self.hash_shift)) & self.hash_mask,
            MaskFunction::FoldOnce => fold_once(hash) & self.hash_mask,
            MaskFunction::FoldTwice => fold_twice(hash) & self.hash_mask,
            MaskFunction::FoldThrice => fold_thrice(hash) & self.hash_mask,
        }
    }

    /// Reduces the sum of two assigned values to a table index.
    #[inline(always)]
    pub fn mask_index(&self, sum: u64) -> u32 {
        match self.function {
            MaskFunction::Modulus => (sum % self.index_modulus as u64) as u32,
            _ => sum as u32 & self.index_mask,
        }
    }

    /// Returns the number of elements of the index space.
    #[inline(always)]
    pub fn index_size(&self) -> u32 {
        self.index_modulus
    }

    /// Returns the value `x` in the index space such that
    /// `mask_index(x + other) == target`.
    #[inline(always)]
    pub fn complement(&self, target: u32, other: u32) -> u32 {
        let size = self.index_modulus as u64;
        ((target as u64 + size - (other as u64 % size)) % size) as u32
    }
}

#[inline(always)]
fn fold_once(hash: u32) -> u32 {
    (hash >> 16) ^ hash
}

#[inline(always)]
fn fold_twice(hash: u32) -> u32 {
    let x = fold_once(hash);
    (x >> 8) ^ x
}

#[inline(always)]
fn fold_thrice(hash: u32) -> u32 {
    let x = fold_twice(hash);
    (x >> 4) ^ x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_auto() {
        assert_eq!(MaskFunction::FoldAuto.resolve(3), MaskFunction::FoldThrice);
        assert_eq!(MaskFunction::FoldAuto.resolve(8), MaskFunction::FoldTwice);
        assert_eq!(MaskFunction::FoldAuto.resolve(12), MaskFunction::FoldOnce);
        assert_eq!(MaskFunction::FoldAuto.resolve(20), MaskFunction::And);
        assert_eq!(MaskFunction::Modulus.resolve(3), MaskFunction::Modulus);
    }

    #[test]
    fn test_ranges() {
        for function in MaskFunction::ALL {
            let (hash_size, index_size) = if function.is_modulus() {
                (37, 16)
            } else {
                (64, 32)
            };
            let masking = Masking::new(function, hash_size, index_size);
            for h in (0..100_000_u32).map(|x| x.wrapping_mul(0x9e3779b1)) {
                assert!(masking.mask_hash(h) < hash_size);
            }
            for s in 0..1000_u64 {
                assert!(masking.mask_index(s) < index_size);
            }
        }
    }

    #[test]
    fn test_complement() {
        for function in [MaskFunction::Modulus, MaskFunction::And] {
            let masking = Masking::new(function, 64, 16);
            for target in 0..16 {
                for other in 0..16 {
                    let x = masking.complement(target, other);
                    assert!(x < 16);
                    assert_eq!(masking.mask_index(x as u64 + other as u64), target);
                }
            }
        }
    }
}
