/*
 *
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Utility functions for key files.

A key file is a flat array of native-endian 32-bit unsigned integers, with no
header. Keys must be distinct.

*/

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

/// Reads keys from a reader until end of file.
pub fn read_keys(mut reader: impl Read) -> io::Result<Vec<u32>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % std::mem::size_of::<u32>() != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Key file length ({} bytes) is not a multiple of {}",
                bytes.len(),
                std::mem::size_of::<u32>()
            ),
        ));
    }
    Ok(bytes
        .chunks_exact(std::mem::size_of::<u32>())
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Loads keys from a key file.
pub fn load_keys(path: impl AsRef<Path>) -> io::Result<Vec<u32>> {
    read_keys(BufReader::new(File::open(path)?))
}

/// Writes keys to a writer.
pub fn write_keys(mut writer: impl Write, keys: &[u32]) -> io::Result<()> {
    for key in keys {
        writer.write_all(&key.to_ne_bytes())?;
    }
    writer.flush()
}

/// Stores keys in a key file.
pub fn store_keys(path: impl AsRef<Path>, keys: &[u32]) -> io::Result<()> {
    write_keys(BufWriter::new(File::create(path)?), keys)
}
