/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![allow(clippy::too_many_arguments)]

use super::context::{SolveContext, SolveState, SolveTotals};
use super::file_work::{file_work_loop, FileEvent, FileWork};
use super::verification::verify;
use super::worker::{Solution, Worker, WorkerEvent};
use crate::graph::{GraphDimensions, DEFAULT_VERTEX_RATIO};
use crate::hash::{HashFunction, MaskFunction};
use crate::table::{IndexError, Table, TableFlags, TableInfoOnDisk};
use crate::utils::{Timer, Timing};
use crossbeam_channel::{Receiver, Sender};
use derivative::Derivative;
use derive_setters::*;
use dsi_progress_logger::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

/// How to compare solutions when looking for the best memory coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestCoverageType {
    /// Prefer assignment arrays with more cache lines containing only zeros.
    HighestNumberOfEmptyCacheLines,
    /// Prefer assignment arrays with fewer cache lines containing only zeros.
    LowestNumberOfEmptyCacheLines,
}

impl BestCoverageType {
    fn is_better(self, candidate: usize, best: usize) -> bool {
        match self {
            BestCoverageType::HighestNumberOfEmptyCacheLines => candidate > best,
            BestCoverageType::LowestNumberOfEmptyCacheLines => candidate < best,
        }
    }
}

/// Best-coverage mode: rather than using the first solution found, keep
/// solving until `num_solutions` solutions have been found and use the best
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestCoverage {
    pub num_solutions: usize,
    pub kind: BestCoverageType,
}

/// Fatal build errors.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("No keys")]
    /// The key set is empty.
    NoKeys,
    #[error("Duplicate key {0}")]
    /// A duplicate key was detected.
    DuplicateKey(u32),
    #[error("Too many keys ({0})")]
    /// The key set is larger than [`MAX_NUM_KEYS`](crate::graph::MAX_NUM_KEYS).
    TooManyKeys(usize),
    #[error("Invalid vertex ratio {0}")]
    /// The ratio between vertices and edges must be finite and larger than
    /// one.
    InvalidVertexRatio(f64),
    #[error("Invalid table size: {num_vertices} vertices for {num_edges} edges")]
    /// The number of vertices is not larger than the number of edges.
    InvalidTableSize { num_vertices: u32, num_edges: u32 },
    #[error("Table size overflow ({0} vertices)")]
    /// The number of vertices does not fit the representation.
    TableSizeOverflow(u64),
    #[error("Insufficient memory to allocate graphs")]
    /// No worker could allocate its graph.
    InsufficientMemory,
    #[error("Could not solve the graph within {0} table resizes")]
    /// Too many resizes.
    ResizeLimitExceeded(usize),
    #[error("Internal error: key of ordinal {key_index} has index {index}")]
    /// An assignment does not map a key to its ordinal.
    InvariantViolation { key_index: u32, index: u32 },
    #[error("Verification failed: expected {expected} keys, found {found}")]
    /// The number of keys to verify is not the number of keys of the table.
    KeyCountMismatch { expected: u64, found: usize },
    #[error("Verification failed: keys {key} and {previous_key} have the same index {index}")]
    /// Two keys have the same index.
    IndexCollision {
        key: u32,
        previous_key: u32,
        index: u32,
    },
    #[error("Verification failed: key {key} has index {index}, out of range")]
    /// A key has an index outside of the index space.
    IndexOutOfRange { key: u32, index: u32 },
    #[error("Verification failed for key {key}")]
    /// The index of a key cannot be computed.
    IndexFailure {
        key: u32,
        #[source]
        source: IndexError,
    },
    #[error("Construction cancelled")]
    /// The external interruption flag was set.
    Cancelled,
    #[error("All workers stopped without a solution")]
    /// Workers stopped for no known reason.
    Exhausted,
    #[error("I/O error while persisting the table: {0}")]
    Io(#[from] io::Error),
}

/// A builder for CHM minimal perfect hash [tables](Table).
///
/// Construction proceeds by rounds: in each round, [a number of parallel
/// workers](ChmBuilder::max_concurrency) try to solve a random graph with the
/// same dimensions using independent seeds. The first worker that succeeds
/// stops the others (but see [best-coverage mode](ChmBuilder::best_coverage)).
/// If the total number of attempts of the round exceeds the [resize
/// threshold](ChmBuilder::resize_threshold) without a solution, the number of
/// vertices is doubled and a new round starts, up to the [resize
/// limit](ChmBuilder::resize_limit).
///
/// The solution is then [verified](ChmBuilder::skip_verification)
/// independently of the construction. When building to a file, a dedicated
/// thread prepares the file while the workers are solving, and writes the
/// assignment array while the solution is verified.
///
/// # Examples
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use pht::chm::ChmBuilder;
/// use dsi_progress_logger::no_logging;
///
/// let keys: Vec<u32> = (0..100).map(|x| x * 7 + 3).collect();
/// let table = ChmBuilder::default()
///     .max_concurrency(2)
///     .try_build(&keys, no_logging![])?;
///
/// let mut indices = keys
///     .iter()
///     .map(|&key| table.index(key))
///     .collect::<Result<Vec<_>, _>>()?;
/// indices.sort();
/// indices.dedup();
/// assert_eq!(indices.len(), 100);
/// #     Ok(())
/// # }
/// ```
#[derive(Setters, Debug, Derivative)]
#[derivative(Default)]
#[setters(generate = false)]
pub struct ChmBuilder {
    /// The hash function. The default is [`HashFunction::Jenkins`].
    #[setters(generate = true)]
    hash_function: HashFunction,

    /// The mask function. The default is [`MaskFunction::And`].
    #[setters(generate = true)]
    mask_function: MaskFunction,

    /// The number of parallel workers. The default is the available
    /// parallelism.
    #[setters(generate = true)]
    #[derivative(Default(value = "default_concurrency()"))]
    max_concurrency: usize,

    /// The number of attempts of a round after which the table is resized.
    /// Zero disables resizing. The default is 100.
    #[setters(generate = true)]
    #[derivative(Default(value = "100"))]
    resize_threshold: u64,

    /// The maximum number of resizes. The default is 5.
    #[setters(generate = true)]
    #[derivative(Default(value = "5"))]
    resize_limit: usize,

    /// The initial number of vertices, overriding the heuristic; it will be
    /// rounded up to a power of two if the mask function requires so.
    #[setters(generate = true, strip_option)]
    table_size: Option<u64>,

    /// The ratio between vertices and edges for modulus masking. The default
    /// is 2.25.
    #[setters(generate = true)]
    #[derivative(Default(value = "DEFAULT_VERTEX_RATIO"))]
    vertex_ratio: f64,

    /// The seed for the random number generator.
    #[setters(generate = true)]
    seed: u64,

    /// Skip the final verification of the solution.
    #[setters(generate = true)]
    skip_verification: bool,

    /// Check for duplicated keys. Keys must be distinct, and duplicates
    /// make construction fail after exhausting all resizes; if you
    /// suspect you might be feeding duplicate keys, you can enable this
    /// check.
    #[setters(generate = true)]
    check_dups: bool,

    /// Best-coverage mode.
    #[setters(generate = true, strip_option)]
    best_coverage: Option<BestCoverage>,

    /// An external flag that cancels the construction when set.
    #[setters(generate = true, strip_option)]
    interrupt: Option<Arc<AtomicBool>>,
}

/// The result of a solving round.
enum Outcome {
    Solved(Table),
    /// The round exceeded the attempt threshold.
    RetryLarger(SolveTotals),
    Fatal(BuildError),
}

/// Statistics about previous rounds.
#[derive(Debug, Clone, Copy, Default)]
struct ResizeStats {
    num_resizes: u32,
    total_attempts: u64,
    /// The smallest number of unpeeled edges.
    closest: Option<u64>,
    initial_table_size: u64,
}

/// The orchestrator side of the file thread.
struct FileIo {
    work: Sender<FileWork>,
    events: Receiver<FileEvent>,
}

fn file_thread_lost() -> BuildError {
    BuildError::Io(io::Error::other("the file thread terminated unexpectedly"))
}

impl ChmBuilder {
    /// Builds a table in core memory.
    ///
    /// Keys must be distinct; the ordinal of a key in `keys` plays no role in
    /// the resulting indices.
    pub fn try_build(
        self,
        keys: &[u32],
        pl: &mut (impl ProgressLog + Clone + Send + Sync),
    ) -> anyhow::Result<Table> {
        self.build_loop(keys, None, pl)
    }

    /// Builds a table and persists it in native format at the given path,
    /// which will be created or truncated. The file is removed if the build
    /// fails.
    ///
    /// The returned table is identical to the one that can be read back
    /// with [`Table::load`].
    pub fn try_build_to_file(
        self,
        keys: &[u32],
        path: impl AsRef<Path>,
        pl: &mut (impl ProgressLog + Clone + Send + Sync),
    ) -> anyhow::Result<Table> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())
            .map_err(BuildError::Io)?;
        let result = self.build_loop(keys, Some(&file), pl);
        if result.is_err() {
            drop(file);
            if let Err(err) = std::fs::remove_file(path.as_ref()) {
                pl.warn(format_args!(
                    "Could not remove {}: {}",
                    path.as_ref().display(),
                    err
                ));
            }
        }
        result
    }

    /// Runs solving rounds until success, resizing the table as needed.
    fn build_loop(
        &self,
        keys: &[u32],
        file: Option<&File>,
        pl: &mut (impl ProgressLog + Clone + Send + Sync),
    ) -> anyhow::Result<Table> {
        if self.check_dups {
            let mut sorted = keys.to_vec();
            sorted.sort_unstable();
            if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
                pl.error(format_args!("Duplicate key {}", w[0]));
                return Err(BuildError::DuplicateKey(w[0]).into());
            }
        }

        let mut dims = match self.table_size {
            Some(table_size) => {
                GraphDimensions::with_num_vertices(keys.len(), self.mask_function, table_size)?
            }
            None => GraphDimensions::new(keys.len(), self.mask_function, self.vertex_ratio)?,
        };

        let num_workers = self.max_concurrency.max(1);
        // One more thread for file work
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(num_workers + usize::from(file.is_some()))
            .thread_name(|i| format!("pht-worker-{}", i))
            .build()?;

        pl.info(format_args!(
            "Number of keys: {} Hash function: {} Mask function: {} Workers: {}",
            keys.len(),
            self.hash_function,
            self.mask_function,
            num_workers
        ));

        let mut prng = SmallRng::seed_from_u64(self.seed);
        let mut resizes = ResizeStats {
            initial_table_size: dims.num_vertices() as u64,
            ..ResizeStats::default()
        };

        loop {
            pl.info(format_args!("{}", dims));
            match self.solve_round(
                keys,
                &dims,
                &mut prng,
                &resizes,
                file,
                &thread_pool,
                &mut pl.concurrent(),
                pl,
            ) {
                Outcome::Solved(table) => return Ok(table),
                Outcome::RetryLarger(totals) => {
                    let unpeeled = totals.unpeeled_edges(dims.num_edges());
                    resizes.num_resizes += 1;
                    resizes.total_attempts += totals.attempts;
                    resizes.closest = Some(resizes.closest.map_or(unpeeled, |c| c.min(unpeeled)));

                    if resizes.num_resizes as usize > self.resize_limit {
                        pl.error(format_args!(
                            "Could not solve the graph within {} table resizes",
                            self.resize_limit
                        ));
                        return Err(BuildError::ResizeLimitExceeded(self.resize_limit).into());
                    }

                    let resized = dims.resized()?;
                    pl.warn(format_args!(
                        "No solution after {} attempts (closest: {} unpeeled edges), resizing from {} to {} vertices...",
                        totals.attempts,
                        unpeeled,
                        dims.num_vertices(),
                        resized.num_vertices()
                    ));
                    dims = resized;
                }
                Outcome::Fatal(error) => {
                    pl.error(format_args!("{}", error));
                    return Err(error.into());
                }
            }
        }
    }

    /// Runs a solving round with the given dimensions.
    ///
    /// Workers are spawned on the thread pool, together with the file thread
    /// if `file` is not `None`, and the calling thread processes their events
    /// in order of arrival until all workers have stopped.
    fn solve_round<C: ConcurrentProgressLog + Send + Sync>(
        &self,
        keys: &[u32],
        dims: &GraphDimensions,
        prng: &mut SmallRng,
        resizes: &ResizeStats,
        file: Option<&File>,
        thread_pool: &ThreadPool,
        main_pl: &mut C,
        pl: &mut impl ProgressLog,
    ) -> Outcome {
        let ctx = SolveContext::new(self.resize_threshold, self.interrupt.clone());
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let num_workers = self.max_concurrency.max(1);
        let num_solutions_needed = self.best_coverage.map_or(1, |b| b.num_solutions.max(1));

        main_pl
            .item_name("attempt")
            .expected_updates(match self.resize_threshold {
                0 => None,
                threshold => Some(threshold as usize),
            })
            .display_memory(true)
            .start(format!("Solving graphs with {} workers...", num_workers));
        let timer = Timer::start();

        thread_pool.in_place_scope(|scope| {
            let file_io = file.map(|file| {
                let (work_tx, work_rx) = crossbeam_channel::unbounded();
                let (file_event_tx, file_event_rx) = crossbeam_channel::unbounded();
                scope.spawn(move |_| file_work_loop(file, work_rx, file_event_tx));
                // Overlap file extension with solving
                let _ = work_tx.send(FileWork::Prepare {
                    num_table_elements: dims.num_vertices() as u64,
                });
                FileIo {
                    work: work_tx,
                    events: file_event_rx,
                }
            });

            ctx.start();
            for index in 0..num_workers {
                let worker = Worker {
                    index,
                    ctx: &ctx,
                    keys,
                    dims: *dims,
                    hash_function: self.hash_function,
                    rng: SmallRng::seed_from_u64(prng.random()),
                    events: event_tx.clone(),
                    first_solution_wins: self.best_coverage.is_none(),
                };
                let mut pl = main_pl.clone();
                scope.spawn(move |_| worker.run(&mut pl));
            }
            // The loop below ends when all workers have dropped their senders
            drop(event_tx);

            let mut best: Option<Solution> = None;
            let mut num_solutions = 0;
            let mut allocation_failures = 0;
            let mut fatal = None;

            for event in event_rx {
                match event {
                    WorkerEvent::Solved(solution) => {
                        num_solutions += 1;
                        let better = match (&best, self.best_coverage) {
                            (None, _) => true,
                            (Some(_), None) => false,
                            (Some(best), Some(coverage)) => coverage.kind.is_better(
                                solution.num_empty_cache_lines,
                                best.num_empty_cache_lines,
                            ),
                        };
                        if better {
                            best = Some(solution);
                        }
                        if num_solutions >= num_solutions_needed {
                            ctx.succeed();
                        }
                    }
                    WorkerEvent::ResizeRequested { worker } => {
                        pl.info(format_args!(
                            "Worker {} exceeded the threshold of {} attempts",
                            worker, self.resize_threshold
                        ));
                    }
                    WorkerEvent::AllocationFailed { worker } => {
                        allocation_failures += 1;
                        pl.warn(format_args!("Worker {} could not allocate its graph", worker));
                        if allocation_failures == num_workers {
                            ctx.fail();
                        }
                    }
                    WorkerEvent::Fatal(error) => {
                        ctx.fail();
                        if fatal.is_none() {
                            fatal = Some(error);
                        }
                    }
                }
            }

            let solve_timing = timer.elapsed();
            main_pl.done();
            let totals = ctx.totals();

            if let Some(error) = fatal {
                return Outcome::Fatal(error);
            }

            let Some(solution) = best else {
                return if ctx.state() == SolveState::Resizing {
                    Outcome::RetryLarger(totals)
                } else if allocation_failures == num_workers {
                    Outcome::Fatal(BuildError::InsufficientMemory)
                } else if ctx.is_interrupted() {
                    Outcome::Fatal(BuildError::Cancelled)
                } else {
                    Outcome::Fatal(BuildError::Exhausted)
                };
            };

            pl.info(format_args!(
                "Solved by worker {} at attempt {} ({} attempts, {} failed, {} solutions) in {:.3} seconds",
                solution.worker,
                solution.attempt,
                totals.attempts,
                totals.failed_attempts,
                totals.finished_count,
                solve_timing.micros as f64 / 1E6
            ));

            let header = self.header(dims, &solution, totals, resizes, solve_timing);
            match file_io {
                None => self.finish(keys, header, solution, pl),
                Some(file_io) => self.finish_with_file(keys, header, solution, file_io, pl),
            }
        })
    }

    /// Fills in a header for a solution.
    fn header(
        &self,
        dims: &GraphDimensions,
        solution: &Solution,
        totals: SolveTotals,
        resizes: &ResizeStats,
        solve_timing: Timing,
    ) -> TableInfoOnDisk {
        let mut header = TableInfoOnDisk::new(dims, self.hash_function, solution.seeds);
        let mut flags = TableFlags::empty();
        if let Some(coverage) = self.best_coverage {
            flags |= TableFlags::FIND_BEST_COVERAGE;
            if coverage.kind == BestCoverageType::LowestNumberOfEmptyCacheLines {
                flags |= TableFlags::LOWEST_COVERAGE;
            }
        }
        if self.skip_verification {
            flags |= TableFlags::SKIP_VERIFICATION;
        }
        header.flags = flags.bits();
        header.concurrency = self.max_concurrency.max(1) as u32;
        header.num_table_resize_events = resizes.num_resizes;
        header.total_attempts_with_smaller_table_sizes = resizes.total_attempts;
        header.closest_with_smaller_table_sizes = resizes.closest.unwrap_or(0);
        header.initial_table_size = resizes.initial_table_size;
        header.num_attempts = totals.attempts;
        header.num_failed_attempts = totals.failed_attempts;
        header.num_solutions_found = totals.finished_count;
        header.set_solve_timing(solve_timing);
        header
    }

    fn verify(
        &self,
        keys: &[u32],
        header: &TableInfoOnDisk,
        solution: &Solution,
        pl: &mut impl ProgressLog,
    ) -> Result<Timing, BuildError> {
        if self.skip_verification {
            return Ok(Timing::default());
        }
        let timer = Timer::start();
        verify(header, &solution.assigned, keys)?;
        let timing = timer.elapsed();
        pl.info(format_args!(
            "Verified {} keys in {:.3} seconds",
            keys.len(),
            timing.micros as f64 / 1E6
        ));
        Ok(timing)
    }

    /// Verifies the solution and builds the table in core memory.
    fn finish(
        &self,
        keys: &[u32],
        mut header: TableInfoOnDisk,
        solution: Solution,
        pl: &mut impl ProgressLog,
    ) -> Outcome {
        match self.verify(keys, &header, &solution, pl) {
            Ok(timing) => header.set_verify_timing(timing),
            Err(error) => return Outcome::Fatal(error),
        }
        Outcome::Solved(Table::new(header, Box::from(&*solution.assigned)))
    }

    /// Waits for the file to be prepared, hands the solution to the file
    /// thread, verifies it while it is being written, and waits for the file
    /// thread to complete the save.
    fn finish_with_file(
        &self,
        keys: &[u32],
        mut header: TableInfoOnDisk,
        solution: Solution,
        file_io: FileIo,
        pl: &mut impl ProgressLog,
    ) -> Outcome {
        match file_io.events.recv() {
            Ok(FileEvent::Prepared(Ok(timing))) => header.set_prepare_file_timing(timing),
            Ok(FileEvent::Prepared(Err(error))) => return Outcome::Fatal(BuildError::Io(error)),
            _ => return Outcome::Fatal(file_thread_lost()),
        }

        let (verified_tx, verified_rx) = crossbeam_channel::bounded(1);
        let save = FileWork::Save {
            header,
            data: solution.assigned.clone(),
            verified: verified_rx,
        };
        if file_io.work.send(save).is_err() {
            return Outcome::Fatal(file_thread_lost());
        }

        match self.verify(keys, &header, &solution, pl) {
            Ok(timing) => {
                let _ = verified_tx.send(timing);
            }
            Err(error) => {
                drop(verified_tx);
                // Wait for the file thread to discard the output
                let _ = file_io.events.recv();
                return Outcome::Fatal(error);
            }
        }

        match file_io.events.recv() {
            Ok(FileEvent::Saved(Ok(header))) => {
                pl.info(format_args!(
                    "Saved {} assigned values in {:.3} seconds",
                    header.num_table_elements,
                    header.save_file_micros as f64 / 1E6
                ));
                Outcome::Solved(Table::new(header, Box::from(&*solution.assigned)))
            }
            Ok(FileEvent::Saved(Err(error))) => Outcome::Fatal(BuildError::Io(error)),
            _ => Outcome::Fatal(file_thread_lost()),
        }
    }
}
