/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use dsi_progress_logger::*;
use epserde::prelude::*;
use pht::chm::verify;
use pht::prelude::*;
use pht::table::{HeaderError, MAGIC_LOW};
use pht::utils::{load_keys, store_keys};
use std::io::Cursor;
use zerocopy::AsBytes;

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

fn keys(n: u32) -> Vec<u32> {
    (0..n).map(|i| i.wrapping_mul(0x9e3779b1) ^ 0x5bd1e995).collect()
}

#[test]
fn test_insert_lookup_delete() -> Result<()> {
    init_logger();
    let keys = keys(10_000);
    let mut table = ChmBuilder::default().try_build(&keys, no_logging![])?;

    for &key in &keys {
        assert_eq!(table.lookup(key)?, 0);
    }
    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(table.insert(key, i as u32 + 1)?, 0);
    }
    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(table.lookup(key)?, i as u32 + 1);
    }
    // Replacing returns the previous value
    assert_eq!(table.insert(keys[0], 100)?, 1);
    assert_eq!(table.delete(keys[0])?, 100);
    assert_eq!(table.lookup(keys[0])?, 0);
    assert_eq!(table.delete(keys[0])?, 0);
    assert_eq!(table.lookup(keys[1])?, 2);

    table.clear_values();
    assert!(table.values().iter().all(|&v| v == 0));
    Ok(())
}

#[test]
fn test_keys_outside_the_set() -> Result<()> {
    init_logger();
    let keys = keys(1000);
    let table = ChmBuilder::default().try_build(&keys, no_logging![])?;
    for key in 1_000_000..1_010_000 {
        let first = table.index(key);
        assert_eq!(first, table.index(key));
        match first {
            Ok(index) => assert!((index as usize) < table.index_size()),
            Err(err) => assert_eq!(err, IndexError::IdenticalHashes(key)),
        }
    }
    Ok(())
}

#[test]
fn test_build_to_file() -> Result<()> {
    init_logger();
    let mut pl = ProgressLogger::default();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("table.pht");
    let keys = keys(50_000);

    for mask_function in [MaskFunction::And, MaskFunction::Modulus] {
        let table = ChmBuilder::default()
            .mask_function(mask_function)
            .try_build_to_file(&keys, &path, &mut pl)?;
        let header = table.header();
        assert_eq!(
            std::fs::metadata(&path)?.len(),
            std::mem::size_of::<TableInfoOnDisk>() as u64 + header.num_table_elements * 4
        );

        let loaded = Table::load(&path)?;
        assert_eq!(loaded.header(), header);
        assert_eq!(loaded.data(), table.data());
        for &key in &keys {
            assert_eq!(loaded.index(key)?, table.index(key)?);
        }
        loaded.verify(&keys)?;
    }
    Ok(())
}

#[test]
fn test_failed_build_to_file() -> Result<()> {
    init_logger();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("table.pht");
    // A duplicate key makes every attempt fail
    let err = ChmBuilder::default()
        .resize_threshold(5)
        .resize_limit(0)
        .try_build_to_file(&[1, 2, 3, 3], &path, no_logging![])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::ResizeLimitExceeded(0))
    ));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_store_and_read() -> Result<()> {
    init_logger();
    let keys = keys(1000);
    let table = ChmBuilder::default()
        .hash_function(HashFunction::Crc32Rotate)
        .try_build(&keys, no_logging![])?;

    let mut bytes = vec![];
    table.write_to(&mut bytes)?;
    let read = Table::read_from(Cursor::new(&bytes))?;
    assert_eq!(read.header(), table.header());
    assert_eq!(read.data(), table.data());

    // Corrupted magic
    bytes[0] ^= 1;
    assert!(matches!(
        Table::read_from(Cursor::new(&bytes)),
        Err(LoadError::Header(HeaderError::BadMagic(..)))
    ));
    bytes[0] ^= 1;

    // Truncated assignment array
    bytes.truncate(bytes.len() - 4);
    assert!(matches!(
        Table::read_from(Cursor::new(&bytes)),
        Err(LoadError::Io(_))
    ));
    assert_eq!(read.header().magic_low, MAGIC_LOW);
    Ok(())
}

#[test]
fn test_read_oversized_header() -> Result<()> {
    init_logger();
    let keys = keys(100);
    let table = ChmBuilder::default()
        .mask_function(MaskFunction::Modulus)
        .try_build(&keys, no_logging![])?;

    // Consistent, but claiming far more elements than the data holds
    let mut header = *table.header();
    header.hash_size = u32::MAX - 1;
    header.hash_modulus = header.hash_size;
    header.num_table_elements = header.hash_size as u64;
    header.check()?;

    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(table.data().as_bytes());
    assert!(matches!(
        Table::read_from(Cursor::new(&bytes)),
        Err(LoadError::Io(_))
    ));
    Ok(())
}

#[test]
fn test_epserde() -> Result<()> {
    init_logger();
    let keys = keys(10_000);
    let mut table = ChmBuilder::default().try_build(&keys, no_logging![])?;
    table.insert(keys[7], 7)?;

    let mut cursor = <AlignedCursor<maligned::A16>>::new();
    table.serialize(&mut cursor)?;
    cursor.set_position(0);
    let eps = <Table>::deserialize_eps(cursor.as_bytes())?;
    assert_eq!(eps.header(), table.header());
    for &key in &keys {
        assert_eq!(eps.index(key)?, table.index(key)?);
    }
    assert_eq!(eps.lookup(keys[7])?, 7);
    Ok(())
}

#[test]
fn test_verify() -> Result<()> {
    init_logger();
    let keys = keys(1000);
    let table = ChmBuilder::default().try_build(&keys, no_logging![])?;
    verify(table.header(), table.data(), &keys)?;

    let err = verify(table.header(), table.data(), &keys[1..]).unwrap_err();
    assert!(matches!(err, BuildError::KeyCountMismatch { .. }));

    let mut dup = keys.clone();
    dup[1] = dup[0];
    let err = verify(table.header(), table.data(), &dup).unwrap_err();
    assert!(matches!(
        err,
        BuildError::IndexCollision { key, previous_key, .. } if key == keys[0] && previous_key == keys[0]
    ));

    let zeroes = vec![0; table.data().len()];
    let err = verify(table.header(), &zeroes, &keys).unwrap_err();
    assert!(matches!(err, BuildError::IndexCollision { index: 0, .. }));

    let err = verify(table.header(), &table.data()[..10], &keys).unwrap_err();
    assert!(matches!(err, BuildError::IndexFailure { .. }));
    Ok(())
}

#[test]
fn test_key_files() -> Result<()> {
    init_logger();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("keys");
    let keys = keys(1234);
    store_keys(&path, &keys)?;
    assert_eq!(load_keys(&path)?, keys);

    let table = ChmBuilder::default().try_build(&load_keys(&path)?, no_logging![])?;
    table.verify(&keys)?;
    Ok(())
}
