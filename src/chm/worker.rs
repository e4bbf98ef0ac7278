/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::context::SolveContext;
use super::BuildError;
use crate::graph::{AttemptError, Graph, GraphDimensions};
use crate::hash::{HashFunction, Seeds};
use crossbeam_channel::Sender;
use dsi_progress_logger::*;
use log::debug;
use rand::rngs::SmallRng;
use rand::Rng;
use std::sync::Arc;

/// A solved graph.
#[derive(Debug, Clone)]
pub(crate) struct Solution {
    /// The worker that found the solution.
    pub worker: usize,
    /// The global number of the successful attempt.
    pub attempt: u64,
    pub seeds: Seeds,
    pub assigned: Arc<[u32]>,
    pub num_empty_cache_lines: usize,
}

/// Events sent by workers to the orchestrator.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Solved(Solution),
    /// The attempt threshold was exceeded, and this worker moved the round to
    /// resizing.
    ResizeRequested { worker: usize },
    /// The worker could not allocate its graph.
    AllocationFailed { worker: usize },
    /// An internal error that must stop the construction.
    Fatal(BuildError),
}

/// A solving worker.
///
/// Each worker owns a [`Graph`] and repeatedly tries to solve it with fresh
/// seeds drawn from its own random number generator, until the round state
/// tells it to stop. The state is polled before every attempt, so a worker
/// performs at most one attempt after the round has ended.
pub(crate) struct Worker<'a> {
    pub index: usize,
    pub ctx: &'a SolveContext,
    pub keys: &'a [u32],
    pub dims: GraphDimensions,
    pub hash_function: HashFunction,
    pub rng: SmallRng,
    pub events: Sender<WorkerEvent>,
    /// Whether to stop after the first solution.
    pub first_solution_wins: bool,
}

impl Worker<'_> {
    fn send(&self, event: WorkerEvent) {
        // The orchestrator keeps the receiver until all workers are done
        let _ = self.events.send(event);
    }

    /// Allocates the graph and runs the seed-search loop.
    pub fn run(mut self, pl: &mut impl ConcurrentProgressLog) {
        let mut graph = match Graph::try_new(self.dims, self.hash_function) {
            Ok(graph) => graph,
            Err(error) => {
                debug!("Worker {} could not allocate its graph: {}", self.index, error);
                self.send(WorkerEvent::AllocationFailed { worker: self.index });
                return;
            }
        };

        let num_seeds = self.hash_function.num_seeds();
        let mut num_attempts = 0_u64;

        while self.ctx.should_continue() {
            let Some(attempt) = self.ctx.next_attempt() else {
                if self.ctx.request_resize() {
                    self.send(WorkerEvent::ResizeRequested { worker: self.index });
                }
                break;
            };
            num_attempts += 1;
            pl.light_update();

            let mut seeds = Seeds::default();
            for seed in &mut seeds[..num_seeds] {
                *seed = self.rng.random();
            }

            match graph.solve(self.keys, seeds) {
                Ok(()) => {
                    if let Err(error) = graph.check_assignment() {
                        self.send(WorkerEvent::Fatal(error));
                        break;
                    }
                    self.ctx.record_success();
                    debug!(
                        "Worker {} solved the graph at attempt {} (global attempt {})",
                        self.index, num_attempts, attempt
                    );
                    self.send(WorkerEvent::Solved(Solution {
                        worker: self.index,
                        attempt,
                        seeds,
                        assigned: Arc::from(graph.assigned()),
                        num_empty_cache_lines: graph.num_empty_cache_lines(),
                    }));
                    if self.first_solution_wins {
                        break;
                    }
                }
                Err(AttemptError::SelfLoop { .. }) => self.ctx.record_failure(0),
                Err(AttemptError::Cyclic { peeled, .. }) => self.ctx.record_failure(peeled),
            }
        }

        debug!("Worker {} stopped after {} attempts", self.index, num_attempts);
    }
}
