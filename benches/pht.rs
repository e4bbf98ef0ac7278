/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dsi_progress_logger::no_logging;
use pht::chm::ChmBuilder;
use pht::graph::{Graph, GraphDimensions, DEFAULT_VERTEX_RATIO};
use pht::hash::{HashFunction, MaskFunction, Seeds};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn random_keys(n: usize) -> Vec<u32> {
    let mut rng = SmallRng::seed_from_u64(0);
    let mut keys: Vec<u32> = (0..n * 2).map(|_| rng.random()).collect();
    keys.sort_unstable();
    keys.dedup();
    keys.truncate(n);
    keys
}

fn bench_hash(c: &mut Criterion) {
    let seeds: Seeds = [0x9e3779b9, 0x7f4a7c15, 0x85ebca6b, 0xc2b2ae35];
    let mut group = c.benchmark_group("hash");
    for hash_function in HashFunction::ALL {
        group.bench_function(hash_function.to_string(), |b| {
            let mut key = 0_u32;
            b.iter(|| {
                key = key.wrapping_add(1);
                black_box(hash_function.hash(black_box(key), &seeds))
            })
        });
    }
    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    for n in [1_000, 100_000] {
        let keys = random_keys(n);
        for mask_function in [MaskFunction::And, MaskFunction::Modulus] {
            let dims = GraphDimensions::new(n, mask_function, DEFAULT_VERTEX_RATIO).unwrap();
            let mut graph = Graph::try_new(dims, HashFunction::Jenkins).unwrap();
            let mut rng = SmallRng::seed_from_u64(0);
            group.bench_with_input(
                BenchmarkId::new(mask_function.to_string(), n),
                &keys,
                |b, keys| {
                    b.iter(|| {
                        let seeds = [rng.random(), rng.random(), 0, 0];
                        black_box(graph.solve(keys, seeds).is_ok())
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let keys = random_keys(1_000_000);
    let table = ChmBuilder::default()
        .try_build(&keys, no_logging![])
        .unwrap();
    c.bench_function("index", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(table.index(black_box(keys[i])).unwrap())
        })
    });
}

criterion_group!(benches, bench_hash, bench_solve, bench_index);
criterion_main!(benches);
