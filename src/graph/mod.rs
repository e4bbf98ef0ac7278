/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Random graphs for CHM construction.

Every key is turned into an edge between the two vertices obtained by
[masking](crate::hash::Masking) its two [hashes](crate::hash::HashFunction).
If the resulting graph is acyclic, it can be peeled, and a value can be
assigned to each vertex so that the masked sum of the values of the endpoints
of each edge is the ordinal of the associated key (Czech, Havas & Majewski,
“An optimal algorithm for generating minimal perfect hash functions”,
Information Processing Letters, 43(5):257–264, 1992).

*/

mod dimensions;
pub use dimensions::*;

mod hypergraph;
pub use hypergraph::Graph;

/// Transient error of a solving attempt, leading to trying with different
/// seeds.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptError {
    #[error("Self-loop on vertex {vertex} for key of index {key_index}")]
    /// The two endpoints of the edge of a key coincide.
    SelfLoop { key_index: u32, vertex: u32 },
    #[error("Cyclic graph (peeled {peeled} out of {num_edges} edges)")]
    /// The graph contains a cycle.
    Cyclic { peeled: u32, num_edges: u32 },
}
