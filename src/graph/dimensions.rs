/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::chm::BuildError;
use crate::hash::{MaskFunction, Masking};
use std::fmt::Display;

/// The maximum number of keys of a table.
///
/// Edge slots are represented by `u32` values and [`u32::MAX`] is reserved, so
/// twice the (rounded) number of edges must fit.
pub const MAX_NUM_KEYS: usize = 1 << 30;

/// The default ratio between vertices and edges for modulus masking.
pub const DEFAULT_VERTEX_RATIO: f64 = 2.25;

/// The dimensions of the graphs of a solving round.
///
/// The number of edges is the number of keys, rounded up to a power of two
/// if the masking function is not [`MaskFunction::Modulus`]. The number of
/// vertices is always strictly larger than the number of edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphDimensions {
    num_keys: u32,
    num_edges: u32,
    num_vertices: u32,
    mask_function: MaskFunction,
    masking: Masking,
}

impl GraphDimensions {
    /// Computes heuristic dimensions for `num_keys` keys.
    ///
    /// With modulus masking the number of vertices is the number of edges
    /// multiplied by `vertex_ratio`; otherwise, it is the smallest power of
    /// two strictly larger than the number of edges.
    pub fn new(
        num_keys: usize,
        mask_function: MaskFunction,
        vertex_ratio: f64,
    ) -> Result<Self, BuildError> {
        let num_edges = Self::compute_num_edges(num_keys, mask_function)?;
        let num_vertices = if mask_function.is_modulus() {
            if !(vertex_ratio.is_finite() && vertex_ratio > 1.0) {
                return Err(BuildError::InvalidVertexRatio(vertex_ratio));
            }
            // Always at least one more vertex than edges
            ((num_edges as f64 * vertex_ratio).ceil() as u64).max(num_edges as u64 + 1)
        } else {
            num_edges as u64 * 2
        };
        Self::build(num_keys, num_edges, num_vertices, mask_function)
    }

    /// Computes dimensions for `num_keys` keys and (approximately) the given
    /// number of vertices.
    ///
    /// The number of vertices is rounded up to a power of two if the masking
    /// function is not [`MaskFunction::Modulus`].
    pub fn with_num_vertices(
        num_keys: usize,
        mask_function: MaskFunction,
        num_vertices: u64,
    ) -> Result<Self, BuildError> {
        let num_edges = Self::compute_num_edges(num_keys, mask_function)?;
        let num_vertices = if mask_function.is_modulus() {
            num_vertices
        } else {
            num_vertices
                .checked_next_power_of_two()
                .ok_or(BuildError::TableSizeOverflow(num_vertices))?
        };
        Self::build(num_keys, num_edges, num_vertices, mask_function)
    }

    /// Returns the dimensions with twice the number of vertices.
    pub fn resized(&self) -> Result<Self, BuildError> {
        Self::with_num_vertices(
            self.num_keys as usize,
            self.mask_function,
            self.num_vertices as u64 * 2,
        )
    }

    fn compute_num_edges(
        num_keys: usize,
        mask_function: MaskFunction,
    ) -> Result<u32, BuildError> {
        if num_keys == 0 {
            return Err(BuildError::NoKeys);
        }
        if num_keys > MAX_NUM_KEYS {
            return Err(BuildError::TooManyKeys(num_keys));
        }
        let num_keys = num_keys as u32;
        Ok(if mask_function.is_modulus() {
            num_keys
        } else {
            num_keys.next_power_of_two()
        })
    }

    fn build(
        num_keys: usize,
        num_edges: u32,
        num_vertices: u64,
        mask_function: MaskFunction,
    ) -> Result<Self, BuildError> {
        // Power-of-two sizes are limited to 2³¹
        let max = if mask_function.is_modulus() {
            u32::MAX as u64
        } else {
            1 << 31
        };
        if num_vertices > max {
            return Err(BuildError::TableSizeOverflow(num_vertices));
        }
        let num_vertices = num_vertices as u32;
        if num_vertices <= num_edges {
            return Err(BuildError::InvalidTableSize {
                num_vertices,
                num_edges,
            });
        }

        Ok(Self {
            num_keys: num_keys as u32,
            num_edges,
            num_vertices,
            mask_function,
            masking: Masking::new(mask_function, num_vertices, num_edges),
        })
    }

    /// Returns the number of keys.
    #[inline(always)]
    pub fn num_keys(&self) -> u32 {
        self.num_keys
    }

    /// Returns the number of edges, which is also the size of the index space.
    #[inline(always)]
    pub fn num_edges(&self) -> u32 {
        self.num_edges
    }

    /// Returns the number of edge slots (two per edge).
    #[inline(always)]
    pub fn total_num_edges(&self) -> u32 {
        self.num_edges * 2
    }

    /// Returns the number of vertices, which is also the size of the hash
    /// space and the length of the assignment array.
    #[inline(always)]
    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    /// Returns the requested (unresolved) mask function.
    #[inline(always)]
    pub fn mask_function(&self) -> MaskFunction {
        self.mask_function
    }

    /// Returns the masking for these dimensions.
    #[inline(always)]
    pub fn masking(&self) -> &Masking {
        &self.masking
    }
}

impl Display for GraphDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Keys: {} Edges: {} Vertices: {} ({:.3} vertices/key) Masking: {}",
            self.num_keys,
            self.num_edges,
            self.num_vertices,
            self.num_vertices as f64 / self.num_keys as f64,
            self.masking.function()
        )
    }
}
