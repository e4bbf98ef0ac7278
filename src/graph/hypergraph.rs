/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{AttemptError, GraphDimensions};
use crate::bits::BitVec;
use crate::chm::BuildError;
use crate::hash::{HashFunction, Seeds};
use std::collections::TryReserveError;
use std::slice::Iter;

/// Sentinel for empty adjacency links.
const EMPTY: u32 = u32::MAX;

/// Number of `u32` values in a 64-byte cache line.
const CACHE_LINE_VALUES: usize = 16;

/// A stack of vertices to visit and a stack of peeled edge slots sharing the
/// same buffer.
///
/// Since every vertex is pushed on the visit stack at most once, and every
/// peeled edge pops a vertex, the sum of the lengths of the two stacks cannot
/// exceed the number of vertices.
#[derive(Debug)]
struct DoubleStack<V> {
    stack: Box<[V]>,
    lower: usize,
    upper: usize,
}

impl<V: Default + Copy> DoubleStack<V> {
    fn try_new(n: usize) -> Result<DoubleStack<V>, TryReserveError> {
        Ok(DoubleStack {
            stack: try_alloc(n, V::default())?,
            lower: 0,
            upper: n,
        })
    }
}

impl<V: Copy> DoubleStack<V> {
    fn clear(&mut self) {
        self.lower = 0;
        self.upper = self.stack.len();
    }

    #[inline(always)]
    fn push_lower(&mut self, v: V) {
        debug_assert!(self.lower < self.upper);
        self.stack[self.lower] = v;
        self.lower += 1;
    }

    #[inline(always)]
    fn push_upper(&mut self, v: V) {
        debug_assert!(self.lower < self.upper);
        self.upper -= 1;
        self.stack[self.upper] = v;
    }

    #[inline(always)]
    fn pop_lower(&mut self) -> Option<V> {
        if self.lower == 0 {
            None
        } else {
            self.lower -= 1;
            Some(self.stack[self.lower])
        }
    }

    fn upper_len(&self) -> usize {
        self.stack.len() - self.upper
    }

    /// Iterates on the upper stack from the last pushed element.
    fn iter_upper(&self) -> Iter<'_, V> {
        self.stack[self.upper..].iter()
    }
}

fn try_alloc<V: Copy>(len: usize, value: V) -> Result<Box<[V]>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, value);
    Ok(v.into_boxed_slice())
}

/// An *r* = 2 hypergraph (i.e., a graph) with one edge per key.
///
/// The edge of the key of ordinal *i* is represented by two edge slots, 2*i*
/// and 2*i* + 1, containing the two endpoints of the edge; the other slot of
/// the edge of slot *s* is thus *s* ⊕ 1. Each vertex has a doubly-linked list
/// of incident slots, stored in the `first`, `next` and `prev` arrays, so that
/// edges can be removed in constant time during peeling.
///
/// A graph is allocated once for given [dimensions](GraphDimensions) and
/// reused across solving attempts: [`Graph::reset`] prepares it for a new
/// attempt without allocating memory.
#[derive(Debug)]
pub struct Graph {
    dims: GraphDimensions,
    hash_function: HashFunction,
    seeds: Seeds,
    /// Maps edge slots to vertices.
    edges: Box<[u32]>,
    /// First incident edge slot of each vertex.
    first: Box<[u32]>,
    /// Next incident edge slot of the same vertex.
    next: Box<[u32]>,
    /// Previous incident edge slot of the same vertex.
    prev: Box<[u32]>,
    /// The assigned value of each vertex.
    assigned: Box<[u32]>,
    deleted_edges: BitVec,
    visited_vertices: BitVec,
    assigned_bitmap: BitVec,
    index_bitmap: BitVec,
    /// Lower stack: vertices to visit; upper stack: peeled edge slots.
    double_stack: DoubleStack<u32>,
    num_edges_added: u32,
}

impl Graph {
    /// Allocates a new graph with the given dimensions.
    ///
    /// Allocation failures are reported rather than aborting, as several
    /// graphs are allocated concurrently.
    pub fn try_new(
        dims: GraphDimensions,
        hash_function: HashFunction,
    ) -> Result<Self, TryReserveError> {
        let total_num_edges = dims.total_num_edges() as usize;
        let num_vertices = dims.num_vertices() as usize;
        Ok(Self {
            dims,
            hash_function,
            seeds: Seeds::default(),
            edges: try_alloc(total_num_edges, EMPTY)?,
            first: try_alloc(num_vertices, EMPTY)?,
            next: try_alloc(total_num_edges, EMPTY)?,
            prev: try_alloc(total_num_edges, EMPTY)?,
            assigned: try_alloc(num_vertices, 0)?,
            deleted_edges: BitVec::try_new(total_num_edges)?,
            visited_vertices: BitVec::try_new(num_vertices)?,
            assigned_bitmap: BitVec::try_new(num_vertices)?,
            index_bitmap: BitVec::try_new(dims.num_edges() as usize)?,
            double_stack: DoubleStack::try_new(num_vertices)?,
            num_edges_added: 0,
        })
    }

    /// Returns the hash function used by [`Graph::load`].
    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    /// Returns the seeds of the current attempt.
    pub fn seeds(&self) -> &Seeds {
        &self.seeds
    }

    /// Returns the assignment array.
    ///
    /// It is meaningful only after a successful [`Graph::solve`] or
    /// [`Graph::assign`].
    pub fn assigned(&self) -> &[u32] {
        &self.assigned
    }

    /// Returns the number of edges peeled by the last call to
    /// [`Graph::peel`].
    pub fn num_peeled(&self) -> u32 {
        self.double_stack.upper_len() as u32
    }

    /// Returns the number of edges added since the last reset.
    pub fn num_edges_added(&self) -> u32 {
        self.num_edges_added
    }

    /// Prepares the graph for a new attempt with the given seeds.
    pub fn reset(&mut self, seeds: Seeds) {
        self.seeds = seeds;
        self.first.fill(EMPTY);
        self.assigned.fill(0);
        self.deleted_edges.reset();
        self.visited_vertices.reset();
        self.assigned_bitmap.reset();
        self.index_bitmap.reset();
        self.double_stack.clear();
        self.num_edges_added = 0;
    }

    #[inline(always)]
    fn link(&mut self, slot: u32, vertex: u32) {
        let (s, v) = (slot as usize, vertex as usize);
        let head = self.first[v];
        self.edges[s] = vertex;
        self.next[s] = head;
        self.prev[s] = EMPTY;
        if head != EMPTY {
            self.prev[head as usize] = slot;
        }
        self.first[v] = slot;
    }

    #[inline(always)]
    fn unlink(&mut self, slot: u32) {
        let s = slot as usize;
        let (p, n) = (self.prev[s], self.next[s]);
        if p == EMPTY {
            self.first[self.edges[s] as usize] = n;
        } else {
            self.next[p as usize] = n;
        }
        if n != EMPTY {
            self.prev[n as usize] = p;
        }
    }

    /// Returns whether `vertex` has exactly one incident edge.
    #[inline(always)]
    fn has_degree_one(&self, vertex: u32) -> bool {
        let head = self.first[vertex as usize];
        head != EMPTY && self.next[head as usize] == EMPTY
    }

    /// Adds the edge of the key of given ordinal.
    ///
    /// Fails if the two endpoints coincide, as such a graph cannot be peeled.
    pub fn add_edge(&mut self, key_index: u32, v1: u32, v2: u32) -> Result<(), AttemptError> {
        debug_assert!(key_index < self.dims.num_edges());
        debug_assert!(v1 < self.dims.num_vertices() && v2 < self.dims.num_vertices());
        if v1 == v2 {
            return Err(AttemptError::SelfLoop {
                key_index,
                vertex: v1,
            });
        }
        self.link(key_index * 2, v1);
        self.link(key_index * 2 + 1, v2);
        self.num_edges_added += 1;
        Ok(())
    }

    /// Resets the graph with the given seeds and adds the edges of all keys.
    pub fn load(&mut self, keys: &[u32], seeds: Seeds) -> Result<(), AttemptError> {
        debug_assert_eq!(keys.len(), self.dims.num_keys() as usize);
        self.reset(seeds);
        let masking = *self.dims.masking();
        for (key_index, &key) in keys.iter().enumerate() {
            let [h1, h2] = self.hash_function.hash(key, &self.seeds);
            self.add_edge(
                key_index as u32,
                masking.mask_hash(h1),
                masking.mask_hash(h2),
            )?;
        }
        Ok(())
    }

    /// Peels the graph.
    ///
    /// Succeeds if all edges added since the last reset have been peeled, in
    /// which case the graph is acyclic and can be [assigned](Graph::assign).
    pub fn peel(&mut self) -> Result<(), AttemptError> {
        self.double_stack.clear();
        // Preload all vertices of degree one in the visit stack
        for v in 0..self.dims.num_vertices() {
            if self.has_degree_one(v) {
                self.double_stack.push_lower(v);
            }
        }

        while let Some(v) = self.double_stack.pop_lower() {
            if !self.has_degree_one(v) {
                // Its last edge has been peeled from the other side
                continue;
            }
            let slot = self.first[v as usize];
            let other = slot ^ 1;
            self.unlink(slot);
            self.unlink(other);
            self.deleted_edges.set(slot as usize, true);
            self.deleted_edges.set(other as usize, true);
            self.visited_vertices.set(v as usize, true);
            self.double_stack.push_upper(slot);

            let u = self.edges[other as usize];
            if self.has_degree_one(u) {
                self.double_stack.push_lower(u);
            }
        }

        let peeled = self.num_peeled();
        if peeled != self.num_edges_added {
            return Err(AttemptError::Cyclic {
                peeled,
                num_edges: self.num_edges_added,
            });
        }
        debug_assert_eq!(self.deleted_edges.count_ones(), 2 * peeled as usize);
        Ok(())
    }

    /// Assigns values to vertices in reverse peeling order, so that the
    /// masked sum of the values of the endpoints of the edge of each key is
    /// the ordinal of the key.
    ///
    /// Vertices that are not assigned by a peeled edge keep the value zero.
    pub fn assign(&mut self) {
        let masking = *self.dims.masking();
        for &slot in self.double_stack.iter_upper() {
            let free = self.edges[slot as usize] as usize;
            let other = self.edges[(slot ^ 1) as usize] as usize;
            debug_assert!(!self.assigned_bitmap[free]);
            if !self.assigned_bitmap.test_and_set(other) {
                // First vertex of its component
                self.assigned[other] = 0;
            }
            self.assigned[free] = masking.complement(slot >> 1, self.assigned[other]);
            self.assigned_bitmap.set(free, true);
        }
    }

    /// Checks that the current assignment maps each key to its ordinal, and
    /// that no two keys share an index.
    pub fn check_assignment(&mut self) -> Result<(), BuildError> {
        let masking = *self.dims.masking();
        self.index_bitmap.reset();
        for key_index in 0..self.num_edges_added {
            let v1 = self.edges[key_index as usize * 2] as usize;
            let v2 = self.edges[key_index as usize * 2 + 1] as usize;
            let index =
                masking.mask_index(self.assigned[v1] as u64 + self.assigned[v2] as u64);
            if index != key_index || self.index_bitmap.test_and_set(index as usize) {
                return Err(BuildError::InvariantViolation { key_index, index });
            }
        }
        Ok(())
    }

    /// Loads, peels and assigns the graph for the given seeds.
    pub fn solve(&mut self, keys: &[u32], seeds: Seeds) -> Result<(), AttemptError> {
        self.load(keys, seeds)?;
        self.peel()?;
        self.assign();
        Ok(())
    }

    /// Returns the number of 64-byte cache lines of the assignment array
    /// containing only zeros.
    pub fn num_empty_cache_lines(&self) -> usize {
        self.assigned
            .chunks(CACHE_LINE_VALUES)
            .filter(|line| line.iter().all(|&x| x == 0))
            .count()
    }
}
