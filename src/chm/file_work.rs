/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::table::TableInfoOnDisk;
use crate::utils::{Timer, Timing};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use zerocopy::AsBytes;

/// Granularity of the preliminary file extension.
const PREPARE_ALIGNMENT: u64 = 1 << 16;

/// Work items for the file thread.
#[derive(Debug)]
pub(crate) enum FileWork {
    /// Extends the file to hold `num_table_elements` assigned values.
    Prepare { num_table_elements: u64 },
    /// Writes the assignment array, waits for the verification signal, and
    /// then writes the header and truncates the file to its exact length.
    ///
    /// If the verification sender is dropped without sending, the save is
    /// aborted and the file is truncated to zero length.
    Save {
        header: TableInfoOnDisk,
        data: Arc<[u32]>,
        verified: Receiver<Timing>,
    },
}

/// Events sent by the file thread.
#[derive(Debug)]
pub(crate) enum FileEvent {
    Prepared(io::Result<Timing>),
    /// The header actually written, with verify and save timings filled in.
    Saved(io::Result<TableInfoOnDisk>),
}

/// Returns the exact length of a persisted table.
pub(crate) fn table_len(num_table_elements: u64) -> u64 {
    std::mem::size_of::<TableInfoOnDisk>() as u64 + num_table_elements * 4
}

fn prepare(file: &File, num_table_elements: u64) -> io::Result<Timing> {
    let timer = Timer::start();
    let len = table_len(num_table_elements).next_multiple_of(PREPARE_ALIGNMENT);
    file.set_len(len)?;
    debug!("Prepared output file ({} bytes)", len);
    Ok(timer.elapsed())
}

fn save(
    file: &File,
    mut header: TableInfoOnDisk,
    data: &[u32],
    verified: Receiver<Timing>,
) -> io::Result<TableInfoOnDisk> {
    let timer = Timer::start();
    let mut writer = file;
    writer.seek(SeekFrom::Start(std::mem::size_of::<TableInfoOnDisk>() as u64))?;
    writer.write_all(data.as_bytes())?;
    writer.flush()?;

    let Ok(verify_timing) = verified.recv() else {
        warn!("Verification failed: discarding the output file");
        file.set_len(0)?;
        return Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "save aborted as verification failed",
        ));
    };

    header.set_verify_timing(verify_timing);
    header.set_save_file_timing(timer.elapsed());
    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(header.as_bytes())?;
    file.set_len(table_len(header.num_table_elements))?;
    file.sync_all()?;
    debug!("Saved table ({} bytes)", table_len(header.num_table_elements));
    Ok(header)
}

/// The loop of the file thread.
///
/// The loop serves work items until the work sender is dropped. The solving
/// threads never touch the file.
pub(crate) fn file_work_loop(file: &File, work: Receiver<FileWork>, events: Sender<FileEvent>) {
    for item in work {
        let event = match item {
            FileWork::Prepare { num_table_elements } => {
                FileEvent::Prepared(prepare(file, num_table_elements))
            }
            FileWork::Save {
                header,
                data,
                verified,
            } => FileEvent::Saved(save(file, header, &data, verified)),
        };
        // The orchestrator might have given up on this round
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphDimensions, DEFAULT_VERTEX_RATIO};
    use crate::hash::{HashFunction, MaskFunction};

    #[test]
    fn test_prepare_and_save() -> anyhow::Result<()> {
        let file = tempfile::tempfile()?;
        let dims = GraphDimensions::new(10, MaskFunction::And, DEFAULT_VERTEX_RATIO)?;
        let header = TableInfoOnDisk::new(&dims, HashFunction::Jenkins, [1, 2, 0, 0]);
        let data: Arc<[u32]> = (0..dims.num_vertices()).collect();

        let (work_tx, work_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        std::thread::scope(|s| -> anyhow::Result<()> {
            s.spawn(|| file_work_loop(&file, work_rx, event_tx));
            work_tx.send(FileWork::Prepare {
                num_table_elements: header.num_table_elements,
            })?;
            assert!(matches!(event_rx.recv()?, FileEvent::Prepared(Ok(_))));
            assert_eq!(file.metadata()?.len(), PREPARE_ALIGNMENT);

            let (verified_tx, verified_rx) = crossbeam_channel::bounded(1);
            work_tx.send(FileWork::Save {
                header,
                data: data.clone(),
                verified: verified_rx,
            })?;
            verified_tx.send(Timing {
                cycles: 1,
                micros: 2,
            })?;
            let FileEvent::Saved(saved) = event_rx.recv()? else {
                panic!("Unexpected event");
            };
            let saved = saved?;
            assert_eq!(saved.verify_micros, 2);
            drop(work_tx);
            Ok(())
        })?;

        assert_eq!(file.metadata()?.len(), table_len(header.num_table_elements));
        Ok(())
    }

    #[test]
    fn test_aborted_save() -> anyhow::Result<()> {
        let file = tempfile::tempfile()?;
        let dims = GraphDimensions::new(10, MaskFunction::And, DEFAULT_VERTEX_RATIO)?;
        let header = TableInfoOnDisk::new(&dims, HashFunction::Jenkins, [1, 2, 0, 0]);
        let (verified_tx, verified_rx) = crossbeam_channel::bounded::<Timing>(1);
        drop(verified_tx);
        let data = vec![0; dims.num_vertices() as usize];
        assert!(save(&file, header, &data, verified_rx).is_err());
        assert_eq!(file.metadata()?.len(), 0);
        Ok(())
    }
}
