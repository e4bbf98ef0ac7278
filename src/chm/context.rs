/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// The state of a solving round.
///
/// A round starts [idle](SolveState::Idle), moves to
/// [solving](SolveState::Solving) when workers are launched, and ends in one
/// of the three terminal states. Workers keep attempting only while the state
/// is [`SolveState::Solving`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SolveState {
    Idle = 0,
    Solving = 1,
    /// Too many attempts: the round must be restarted with a larger table.
    Resizing = 2,
    /// Enough solutions have been found.
    Succeeded = 3,
    /// The round has been stopped without a solution.
    Failed = 4,
}

impl SolveState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SolveState::Idle,
            1 => SolveState::Solving,
            2 => SolveState::Resizing,
            3 => SolveState::Succeeded,
            _ => SolveState::Failed,
        }
    }
}

/// Counters of a solving round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveTotals {
    pub attempts: u64,
    pub failed_attempts: u64,
    pub finished_count: u64,
    /// The largest number of edges peeled by a failed attempt.
    pub highest_deleted_edges: u32,
}

impl SolveTotals {
    /// Returns the number of edges left unpeeled by the failed attempt that
    /// came closest to success in a graph with `num_edges` edges.
    ///
    /// Edges beyond the number of keys are never added to the graph, so for
    /// power-of-two masks they count as unpeeled.
    pub fn unpeeled_edges(&self, num_edges: u32) -> u64 {
        num_edges.saturating_sub(self.highest_deleted_edges) as u64
    }
}

/// State shared between the orchestrator and the workers of a solving round.
///
/// Workers poll the state before every attempt and update the counters
/// atomically; solutions and other events travel on a channel. Only the
/// orchestrator moves the round to a terminal state, except for
/// [resize requests](SolveContext::request_resize), which are issued by the
/// worker that exceeds the attempt threshold.
#[derive(Debug)]
pub(crate) struct SolveContext {
    state: AtomicU8,
    interrupt: Option<Arc<AtomicBool>>,
    /// Zero disables resizing.
    resize_threshold: u64,
    attempts: AtomicU64,
    failed_attempts: AtomicU64,
    finished_count: AtomicU64,
    highest_deleted_edges: AtomicU32,
}

impl SolveContext {
    pub fn new(resize_threshold: u64, interrupt: Option<Arc<AtomicBool>>) -> Self {
        Self {
            state: AtomicU8::new(SolveState::Idle as u8),
            interrupt,
            resize_threshold,
            attempts: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            finished_count: AtomicU64::new(0),
            highest_deleted_edges: AtomicU32::new(0),
        }
    }

    #[inline(always)]
    pub fn state(&self) -> SolveState {
        SolveState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: SolveState, to: SolveState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Moves from idle to solving.
    pub fn start(&self) -> bool {
        self.transition(SolveState::Idle, SolveState::Solving)
    }

    /// Moves to [`SolveState::Succeeded`] from [`SolveState::Solving`] or
    /// from [`SolveState::Resizing`]: a solution that arrives after a resize
    /// request is still used.
    pub fn succeed(&self) -> bool {
        self.transition(SolveState::Solving, SolveState::Succeeded)
            || self.transition(SolveState::Resizing, SolveState::Succeeded)
    }

    /// Moves from solving to failed.
    pub fn fail(&self) -> bool {
        self.transition(SolveState::Solving, SolveState::Failed)
    }

    /// Moves from solving to resizing; returns true if this call caused the
    /// transition.
    pub fn request_resize(&self) -> bool {
        self.transition(SolveState::Solving, SolveState::Resizing)
    }

    /// Returns whether an external interruption was requested.
    #[inline(always)]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Returns whether workers should perform another attempt.
    #[inline(always)]
    pub fn should_continue(&self) -> bool {
        self.state() == SolveState::Solving && !self.is_interrupted()
    }

    /// Counts a new attempt, returning its (one-based) number, or `None` if
    /// the attempt threshold has been exceeded.
    #[inline(always)]
    pub fn next_attempt(&self) -> Option<u64> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.resize_threshold != 0 && attempt > self.resize_threshold {
            None
        } else {
            Some(attempt)
        }
    }

    /// Records a failed attempt that peeled `deleted_edges` edges.
    #[inline(always)]
    pub fn record_failure(&self, deleted_edges: u32) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        self.highest_deleted_edges
            .fetch_max(deleted_edges, Ordering::Relaxed);
    }

    /// Records a successful attempt, returning the number of successful
    /// attempts so far.
    #[inline(always)]
    pub fn record_success(&self) -> u64 {
        self.finished_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn totals(&self) -> SolveTotals {
        SolveTotals {
            // Attempts beyond the threshold are abandoned before starting
            attempts: match self.resize_threshold {
                0 => self.attempts.load(Ordering::Relaxed),
                threshold => self.attempts.load(Ordering::Relaxed).min(threshold),
            },
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            finished_count: self.finished_count.load(Ordering::Relaxed),
            highest_deleted_edges: self.highest_deleted_edges.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphDimensions, DEFAULT_VERTEX_RATIO};
    use crate::hash::MaskFunction;

    #[test]
    fn test_transitions() {
        let ctx = SolveContext::new(3, None);
        assert_eq!(ctx.state(), SolveState::Idle);
        assert!(!ctx.should_continue());
        assert!(ctx.start());
        assert!(ctx.should_continue());
        assert_eq!(ctx.next_attempt(), Some(1));
        assert_eq!(ctx.next_attempt(), Some(2));
        assert_eq!(ctx.next_attempt(), Some(3));
        assert_eq!(ctx.next_attempt(), None);
        assert!(ctx.request_resize());
        assert!(!ctx.request_resize());
        assert!(!ctx.should_continue());
        assert!(ctx.succeed());
        assert_eq!(ctx.state(), SolveState::Succeeded);
        assert!(!ctx.fail());
        assert_eq!(ctx.totals().attempts, 3);
    }

    #[test]
    fn test_interrupt() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = SolveContext::new(0, Some(flag.clone()));
        ctx.start();
        assert!(ctx.should_continue());
        flag.store(true, Ordering::Relaxed);
        assert!(!ctx.should_continue());
        assert!(ctx.is_interrupted());
    }

    #[test]
    fn test_counters() {
        let ctx = SolveContext::new(0, None);
        ctx.record_failure(10);
        ctx.record_failure(7);
        assert_eq!(ctx.record_success(), 1);
        let totals = ctx.totals();
        assert_eq!(totals.failed_attempts, 2);
        assert_eq!(totals.finished_count, 1);
        assert_eq!(totals.highest_deleted_edges, 10);
    }

    #[test]
    fn test_unpeeled_edges() -> anyhow::Result<()> {
        let ctx = SolveContext::new(0, None);
        ctx.record_failure(990);
        let totals = ctx.totals();

        let dims = GraphDimensions::new(1000, MaskFunction::And, DEFAULT_VERTEX_RATIO)?;
        assert_eq!(dims.num_edges(), 1024);
        assert_eq!(totals.unpeeled_edges(dims.num_edges()), 34);

        let dims = GraphDimensions::new(1000, MaskFunction::Modulus, DEFAULT_VERTEX_RATIO)?;
        assert_eq!(totals.unpeeled_edges(dims.num_edges()), 10);

        assert_eq!(SolveTotals::default().unpeeled_edges(0), 0);
        Ok(())
    }
}
