/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Minimal perfect hash tables for 32-bit keys.
//!
//! Tables are built with the Czech–Havas–Majewski (CHM) technique: every key
//! is an edge of a random graph with two vertices per edge, and once the
//! graph is acyclic every vertex is assigned a value so that the two values
//! of a key add up to its ordinal. Construction is driven by a
//! [`ChmBuilder`](chm::ChmBuilder), which searches for a suitable graph in
//! parallel and can persist the resulting [`Table`](table::Table) while
//! verifying it.

#![deny(unconditional_recursion)]

pub mod bits;
pub mod chm;
pub mod graph;
pub mod hash;
pub mod table;
pub mod utils;

pub mod prelude {
    pub use crate::chm::{BestCoverage, BestCoverageType, BuildError, ChmBuilder};
    pub use crate::hash::{HashFunction, MaskFunction};
    pub use crate::table::{IndexError, LoadError, Table, TableInfoOnDisk};
}
