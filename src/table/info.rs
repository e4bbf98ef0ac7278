/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::graph::GraphDimensions;
use crate::hash::{HashFunction, MaskFunction, Masking, Seeds, MAX_SEEDS};
use crate::utils::Timing;
use epserde::prelude::*;
use mem_dbg::*;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Low half of the magic number.
pub const MAGIC_LOW: u32 = 0x25101981;
/// High half of the magic number.
pub const MAGIC_HIGH: u32 = 0x17071953;

/// Identifier of the CHM algorithm with one graph per key set.
pub const ALGORITHM_CHM01: u32 = 1;

bitflags::bitflags! {
    /// Construction flags recorded in a table header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TableFlags: u32 {
        /// The table was built looking for the best memory coverage.
        const FIND_BEST_COVERAGE = 1;
        /// Best coverage minimized, rather than maximized, empty cache lines.
        const LOWEST_COVERAGE = 1 << 1;
        /// Verification was skipped.
        const SKIP_VERIFICATION = 1 << 2;
    }
}

/// The fixed-layout header of a persisted table.
///
/// The header is followed on disk by
/// [`num_table_elements`](TableInfoOnDisk::num_table_elements) 32-bit
/// assigned values. All fields are in native endianness and the structure has
/// no padding.
#[derive(Epserde, Debug, Clone, Copy, PartialEq, Eq, MemDbg, MemSize)]
#[derive(AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
#[zero_copy]
pub struct TableInfoOnDisk {
    pub magic_low: u32,
    pub magic_high: u32,
    /// The size in bytes of this structure.
    pub size_of_struct: u32,
    pub flags: u32,
    /// The maximum concurrency used during construction.
    pub concurrency: u32,
    pub algorithm_id: u32,
    pub hash_function_id: u32,
    /// The identifier of the resolved mask function.
    pub mask_function_id: u32,
    pub key_size_in_bytes: u32,
    /// The number of vertices.
    pub hash_size: u32,
    /// The number of edges.
    pub index_size: u32,
    pub hash_shift: u32,
    pub index_shift: u32,
    pub hash_mask: u32,
    pub index_mask: u32,
    pub hash_fold: u32,
    pub index_fold: u32,
    pub hash_modulus: u32,
    pub index_modulus: u32,
    pub num_seeds: u32,
    pub seeds: Seeds,
    pub num_table_resize_events: u32,
    pub reserved: u32,

    pub num_keys: u64,
    /// The length of the assignment array.
    pub num_table_elements: u64,
    pub total_attempts_with_smaller_table_sizes: u64,
    /// The smallest number of edges left unpeeled by a failed attempt with
    /// smaller table sizes, counted against the number of edges of the
    /// graph. For power-of-two masks this includes the padding edges beyond
    /// the number of keys.
    pub closest_with_smaller_table_sizes: u64,
    /// The number of vertices before the first resize.
    pub initial_table_size: u64,
    pub num_attempts: u64,
    pub num_failed_attempts: u64,
    pub num_solutions_found: u64,
    pub solve_cycles: u64,
    pub solve_micros: u64,
    pub verify_cycles: u64,
    pub verify_micros: u64,
    pub prepare_file_cycles: u64,
    pub prepare_file_micros: u64,
    pub save_file_cycles: u64,
    pub save_file_micros: u64,
}

const _: () = assert!(std::mem::size_of::<TableInfoOnDisk>() == 26 * 4 + 16 * 8);

/// Errors in a table header.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Bad magic number ({0:#010x}, {1:#010x})")]
    BadMagic(u32, u32),
    #[error("Bad header size: expected {expected}, found {found}")]
    BadSize { expected: u32, found: u32 },
    #[error("Unknown algorithm identifier {0}")]
    UnknownAlgorithm(u32),
    #[error("Unknown hash function identifier {0}")]
    UnknownHashFunction(u32),
    #[error("Unknown mask function identifier {0}")]
    UnknownMaskFunction(u32),
    #[error("Unsupported key size {0}")]
    UnsupportedKeySize(u32),
    #[error("Inconsistent header: {0}")]
    Inconsistent(&'static str),
}

impl Default for TableInfoOnDisk {
    fn default() -> Self {
        Self::new_zeroed()
    }
}

impl TableInfoOnDisk {
    /// Creates a header describing a table with the given dimensions, hash
    /// function and seeds. Statistics are left to zero.
    pub fn new(dims: &GraphDimensions, hash_function: HashFunction, seeds: Seeds) -> Self {
        let masking = dims.masking();
        let mut header = Self::new_zeroed();
        header.magic_low = MAGIC_LOW;
        header.magic_high = MAGIC_HIGH;
        header.size_of_struct = std::mem::size_of::<Self>() as u32;
        header.algorithm_id = ALGORITHM_CHM01;
        header.hash_function_id = hash_function.id();
        header.mask_function_id = masking.function().id();
        header.key_size_in_bytes = std::mem::size_of::<u32>() as u32;
        header.hash_size = dims.num_vertices();
        header.index_size = dims.num_edges();
        header.hash_shift = dims.num_vertices().trailing_zeros();
        header.index_shift = dims.num_edges().trailing_zeros();
        header.hash_mask = masking.hash_mask();
        header.index_mask = masking.index_mask();
        header.hash_fold = masking.function().fold();
        header.hash_modulus = dims.num_vertices();
        header.index_modulus = dims.num_edges();
        header.num_seeds = hash_function.num_seeds() as u32;
        header.seeds = seeds;
        header.num_keys = dims.num_keys() as u64;
        header.num_table_elements = dims.num_vertices() as u64;
        header
    }

    /// Returns the construction flags.
    pub fn flags(&self) -> TableFlags {
        TableFlags::from_bits_truncate(self.flags)
    }

    /// Returns the hash function, if the identifier is valid.
    #[inline(always)]
    pub fn hash_function(&self) -> Option<HashFunction> {
        HashFunction::from_id(self.hash_function_id)
    }

    /// Returns the resolved mask function, if the identifier is valid.
    #[inline(always)]
    pub fn mask_function(&self) -> Option<MaskFunction> {
        MaskFunction::from_id(self.mask_function_id)
    }

    /// Returns the masking described by this header, if the mask function
    /// identifier is valid.
    #[inline(always)]
    pub fn masking(&self) -> Option<Masking> {
        Some(Masking::from_parts(
            self.mask_function()?,
            self.hash_shift,
            self.hash_mask,
            self.hash_modulus,
            self.index_mask,
            self.index_modulus,
        ))
    }

    /// Records a timing in the solve fields.
    pub fn set_solve_timing(&mut self, timing: Timing) {
        self.solve_cycles = timing.cycles;
        self.solve_micros = timing.micros;
    }

    /// Records a timing in the verify fields.
    pub fn set_verify_timing(&mut self, timing: Timing) {
        self.verify_cycles = timing.cycles;
        self.verify_micros = timing.micros;
    }

    /// Records a timing in the prepare-file fields.
    pub fn set_prepare_file_timing(&mut self, timing: Timing) {
        self.prepare_file_cycles = timing.cycles;
        self.prepare_file_micros = timing.micros;
    }

    /// Records a timing in the save-file fields.
    pub fn set_save_file_timing(&mut self, timing: Timing) {
        self.save_file_cycles = timing.cycles;
        self.save_file_micros = timing.micros;
    }

    /// Checks that this header describes a table this crate can query.
    pub fn check(&self) -> Result<(), HeaderError> {
        if self.magic_low != MAGIC_LOW || self.magic_high != MAGIC_HIGH {
            return Err(HeaderError::BadMagic(self.magic_low, self.magic_high));
        }
        let expected = std::mem::size_of::<Self>() as u32;
        if self.size_of_struct != expected {
            return Err(HeaderError::BadSize {
                expected,
                found: self.size_of_struct,
            });
        }
        if self.algorithm_id != ALGORITHM_CHM01 {
            return Err(HeaderError::UnknownAlgorithm(self.algorithm_id));
        }
        let hash_function = self
            .hash_function()
            .ok_or(HeaderError::UnknownHashFunction(self.hash_function_id))?;
        let mask_function = self
            .mask_function()
            .ok_or(HeaderError::UnknownMaskFunction(self.mask_function_id))?;
        if mask_function == MaskFunction::FoldAuto {
            return Err(HeaderError::Inconsistent("unresolved mask function"));
        }
        if self.key_size_in_bytes != std::mem::size_of::<u32>() as u32 {
            return Err(HeaderError::UnsupportedKeySize(self.key_size_in_bytes));
        }
        if self.num_seeds as usize != hash_function.num_seeds() || self.num_seeds as usize > MAX_SEEDS
        {
            return Err(HeaderError::Inconsistent("wrong number of seeds"));
        }
        if self.index_size == 0 || self.hash_size <= self.index_size {
            return Err(HeaderError::Inconsistent("table sizes"));
        }
        if self.num_keys == 0 || self.num_keys > self.index_size as u64 {
            return Err(HeaderError::Inconsistent("number of keys"));
        }
        if self.num_table_elements != self.hash_size as u64 {
            return Err(HeaderError::Inconsistent("number of table elements"));
        }
        if self.hash_modulus != self.hash_size || self.index_modulus != self.index_size {
            return Err(HeaderError::Inconsistent("moduli"));
        }
        if !mask_function.is_modulus()
            && (!self.hash_size.is_power_of_two()
                || !self.index_size.is_power_of_two()
                || self.hash_mask != self.hash_size - 1
                || self.index_mask != self.index_size - 1
                || self.hash_shift != self.hash_size.trailing_zeros())
        {
            return Err(HeaderError::Inconsistent("masks"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DEFAULT_VERTEX_RATIO;

    #[test]
    fn test_new_and_check() -> anyhow::Result<()> {
        for mask_function in MaskFunction::ALL {
            let dims = GraphDimensions::new(1000, mask_function, DEFAULT_VERTEX_RATIO)?;
            let header = TableInfoOnDisk::new(&dims, HashFunction::Crc32Rotate, [1, 2, 3, 0]);
            header.check()?;
            assert_eq!(header.num_seeds, 3);
            assert_ne!(header.mask_function_id, MaskFunction::FoldAuto.id());
            assert_eq!(header.masking(), Some(*dims.masking()));
        }
        Ok(())
    }

    #[test]
    fn test_check_failures() -> anyhow::Result<()> {
        let dims = GraphDimensions::new(10, MaskFunction::And, DEFAULT_VERTEX_RATIO)?;
        let header = TableInfoOnDisk::new(&dims, HashFunction::Jenkins, [1, 2, 0, 0]);

        let mut bad = header;
        bad.magic_high = 0;
        assert!(matches!(bad.check(), Err(HeaderError::BadMagic(..))));

        let mut bad = header;
        bad.hash_function_id = 42;
        assert_eq!(bad.check(), Err(HeaderError::UnknownHashFunction(42)));

        let mut bad = header;
        bad.hash_size = bad.index_size;
        assert!(matches!(bad.check(), Err(HeaderError::Inconsistent(_))));

        assert_eq!(TableInfoOnDisk::default().as_bytes().len(), 232);
        Ok(())
    }
}
