/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{HeaderError, TableInfoOnDisk};
use crate::chm::{verify, BuildError};
use crate::hash::{HashFunction, Seeds};
use epserde::prelude::*;
use mem_dbg::*;
use std::collections::TryReserveError;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use zerocopy::{AsBytes, FromZeroes};

/// Errors of index computations.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("The two hashes of key {0} are identical")]
    /// The two raw hashes of the key coincide. This cannot happen for keys
    /// used to build the table.
    IdenticalHashes(u32),
    #[error("Corrupted table")]
    /// The header is inconsistent with the assignment array.
    Corrupted,
}

/// Errors reading a persisted table.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Could not allocate the assignment array")]
    Alloc(#[from] TryReserveError),
}

/// Number of elements of the assignment array read at a time.
const READ_CHUNK: usize = 1 << 16;

/// Computes the index of `key` using only a header and an assignment array.
#[inline(always)]
pub(crate) fn index_in(header: &TableInfoOnDisk, data: &[u32], key: u32) -> Result<u32, IndexError> {
    let hash_function = header.hash_function().ok_or(IndexError::Corrupted)?;
    let masking = header.masking().ok_or(IndexError::Corrupted)?;
    let [h1, h2] = hash_function.hash(key, &header.seeds);
    if h1 == h2 {
        return Err(IndexError::IdenticalHashes(key));
    }
    let a1 = *data
        .get(masking.mask_hash(h1) as usize)
        .ok_or(IndexError::Corrupted)?;
    let a2 = *data
        .get(masking.mask_hash(h2) as usize)
        .ok_or(IndexError::Corrupted)?;
    Ok(masking.mask_index(a1 as u64 + a2 as u64))
}

/// A minimal perfect hash table for 32-bit keys.
///
/// The table maps each of the keys it was built from to a distinct index in
/// [0 . . *n*), where *n* is the [size of the index
/// space](Table::index_size), and stores a 32-bit value for each index.
///
/// No membership check is performed: querying a key outside of the original
/// key set returns an arbitrary (but repeatable) index, possibly shared with
/// other keys, and never panics.
///
/// Instances are built using a [`ChmBuilder`](crate::chm::ChmBuilder) and can
/// be serialized using [ε-serde](`epserde`); deserializing with
/// [`deserialize_eps`](epserde::deser::Deserialize::deserialize_eps) yields a
/// `Table<&[u32]>`, which supports queries but not updates.
#[derive(Epserde, Debug, Clone, MemDbg, MemSize)]
pub struct Table<D = Box<[u32]>> {
    pub(crate) header: TableInfoOnDisk,
    pub(crate) data: D,
    pub(crate) values: D,
}

impl Table<Box<[u32]>> {
    /// Creates a table from a header and an assignment array, with all
    /// values set to zero.
    pub(crate) fn new(header: TableInfoOnDisk, data: Box<[u32]>) -> Self {
        debug_assert_eq!(header.num_table_elements, data.len() as u64);
        let values = vec![0; header.num_table_elements as usize].into_boxed_slice();
        Self {
            header,
            data,
            values,
        }
    }

    /// Reads a table in native format.
    pub fn read_from(mut reader: impl Read) -> Result<Self, LoadError> {
        let mut header = TableInfoOnDisk::new_zeroed();
        reader.read_exact(header.as_bytes_mut())?;
        header.check()?;
        // Memory grows only with the data actually read
        let len = header.num_table_elements as usize;
        let mut data: Vec<u32> = Vec::new();
        let mut buf = vec![0_u32; READ_CHUNK.min(len)];
        while data.len() < len {
            let chunk = &mut buf[..READ_CHUNK.min(len - data.len())];
            reader.read_exact(chunk.as_bytes_mut())?;
            data.try_reserve(chunk.len())?;
            data.extend_from_slice(chunk);
        }
        Ok(Self::new(header, data.into_boxed_slice()))
    }

    /// Loads a table in native format from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}

impl<D: AsRef<[u32]>> Table<D> {
    /// Returns the header of this table.
    pub fn header(&self) -> &TableInfoOnDisk {
        &self.header
    }

    /// Returns the assignment array.
    pub fn data(&self) -> &[u32] {
        self.data.as_ref()
    }

    /// Returns the values array.
    pub fn values(&self) -> &[u32] {
        self.values.as_ref()
    }

    /// Returns the number of keys the table was built from.
    pub fn num_keys(&self) -> usize {
        self.header.num_keys as usize
    }

    /// Returns the size of the index space.
    pub fn index_size(&self) -> usize {
        self.header.index_size as usize
    }

    /// Returns the hash function of this table.
    pub fn hash_function(&self) -> Option<HashFunction> {
        self.header.hash_function()
    }

    /// Returns the seeds of this table.
    pub fn seeds(&self) -> &Seeds {
        &self.header.seeds
    }

    /// Returns the index of a key.
    ///
    /// The result is in [0 . . [`index_size`](Table::index_size)), and it is
    /// distinct for distinct keys of the original key set.
    #[inline]
    pub fn index(&self, key: u32) -> Result<u32, IndexError> {
        index_in(&self.header, self.data.as_ref(), key)
    }

    /// Returns the value associated with the index of a key, or zero if no
    /// value was inserted at that index.
    #[inline]
    pub fn lookup(&self, key: u32) -> Result<u32, IndexError> {
        let index = self.index(key)?;
        self.values
            .as_ref()
            .get(index as usize)
            .copied()
            .ok_or(IndexError::Corrupted)
    }

    /// Checks that the keys are mapped to distinct indices.
    pub fn verify(&self, keys: &[u32]) -> Result<(), BuildError> {
        verify(&self.header, self.data.as_ref(), keys)
    }

    /// Writes this table in native format.
    pub fn write_to(&self, mut writer: impl Write) -> io::Result<()> {
        writer.write_all(self.header.as_bytes())?;
        writer.write_all(self.data.as_ref().as_bytes())?;
        writer.flush()
    }

    /// Stores this table in native format in a file.
    pub fn store(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }
}

impl<D: AsRef<[u32]> + AsMut<[u32]>> Table<D> {
    #[inline(always)]
    fn value_mut(&mut self, key: u32) -> Result<&mut u32, IndexError> {
        let index = self.index(key)?;
        self.values
            .as_mut()
            .get_mut(index as usize)
            .ok_or(IndexError::Corrupted)
    }

    /// Stores a value at the index of a key, returning the previous value.
    #[inline]
    pub fn insert(&mut self, key: u32, value: u32) -> Result<u32, IndexError> {
        Ok(std::mem::replace(self.value_mut(key)?, value))
    }

    /// Clears the value at the index of a key, returning the previous value.
    #[inline]
    pub fn delete(&mut self, key: u32) -> Result<u32, IndexError> {
        Ok(std::mem::take(self.value_mut(key)?))
    }

    /// Clears all values.
    pub fn clear_values(&mut self) {
        self.values.as_mut().fill(0);
    }
}
