/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Parallel construction of CHM tables.
//!
//! The [`ChmBuilder`] runs rounds of parallel seed searches on acyclic
//! [graphs](crate::graph::Graph), resizing the graph when a round exceeds
//! its attempt budget. When building to a file, an auxiliary thread prepares
//! the output file during the search and saves the solution while it is
//! being verified.

mod builder;
pub use builder::*;

mod context;
pub use context::{SolveState, SolveTotals};

mod file_work;
mod worker;

mod verification;
pub use verification::verify;
