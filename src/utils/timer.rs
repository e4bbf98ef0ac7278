/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::time::Instant;

/// Reads the CPU timestamp counter, or returns zero on architectures without
/// one.
#[inline(always)]
pub fn cycles() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: RDTSC is available on every x86-64 CPU.
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        0
    }
}

/// Elapsed time of a phase, both in CPU cycles and in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub cycles: u64,
    pub micros: u64,
}

/// A stopwatch measuring both CPU cycles and wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
    start_cycles: u64,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            start_cycles: cycles(),
        }
    }

    /// Returns the time elapsed since the timer was started.
    pub fn elapsed(&self) -> Timing {
        Timing {
            cycles: cycles().wrapping_sub(self.start_cycles),
            micros: self.start.elapsed().as_micros() as u64,
        }
    }
}
