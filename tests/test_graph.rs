/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use pht::chm::BuildError;
use pht::graph::*;
use pht::hash::{HashFunction, MaskFunction, Seeds};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_seeds(rng: &mut SmallRng) -> Seeds {
    [rng.random(), rng.random(), rng.random(), rng.random()]
}

#[test]
fn test_solve_is_deterministic() -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(0);
    let keys: Vec<u32> = (0..1000).map(|i| i * 3 + 1).collect();
    let combinations = HashFunction::ALL
        .map(|hash_function| (hash_function, MaskFunction::Modulus))
        .into_iter()
        .chain([(HashFunction::Jenkins, MaskFunction::And)]);

    for (hash_function, mask_function) in combinations {
        let dims = GraphDimensions::new(keys.len(), mask_function, DEFAULT_VERTEX_RATIO)?;
        let mut graph = Graph::try_new(dims, hash_function)?;

        let seeds = (0..10_000)
            .map(|_| random_seeds(&mut rng))
            .find(|&seeds| graph.solve(&keys, seeds).is_ok())
            .expect("no solution found");
        graph.check_assignment()?;
        let assigned = graph.assigned().to_vec();

        // Dirty the graph with a different attempt
        let _ = graph.solve(&keys, random_seeds(&mut rng));
        graph.solve(&keys, seeds)?;
        assert_eq!(graph.assigned(), assigned.as_slice());
        assert_eq!(graph.num_peeled(), keys.len() as u32);
    }
    Ok(())
}

#[test]
fn test_self_loop() -> Result<()> {
    let dims = GraphDimensions::new(3, MaskFunction::Modulus, DEFAULT_VERTEX_RATIO)?;
    let mut graph = Graph::try_new(dims, HashFunction::Jenkins)?;
    graph.reset([0; 4]);
    graph.add_edge(0, 1, 2)?;
    assert_eq!(
        graph.add_edge(1, 4, 4),
        Err(AttemptError::SelfLoop {
            key_index: 1,
            vertex: 4
        })
    );
    assert_eq!(graph.num_edges_added(), 1);
    Ok(())
}

#[test]
fn test_duplicate_edge() -> Result<()> {
    let dims = GraphDimensions::new(2, MaskFunction::Modulus, DEFAULT_VERTEX_RATIO)?;
    let mut graph = Graph::try_new(dims, HashFunction::Jenkins)?;
    graph.reset([0; 4]);
    graph.add_edge(0, 1, 2)?;
    graph.add_edge(1, 2, 1)?;
    assert_eq!(
        graph.peel(),
        Err(AttemptError::Cyclic {
            peeled: 0,
            num_edges: 2
        })
    );
    Ok(())
}

#[test]
fn test_duplicate_keys_never_solve() -> Result<()> {
    let keys = [7, 11, 7];
    let dims = GraphDimensions::new(keys.len(), MaskFunction::And, DEFAULT_VERTEX_RATIO)?;
    let mut graph = Graph::try_new(dims, HashFunction::Jenkins)?;
    let mut rng = SmallRng::seed_from_u64(1);
    for _ in 0..100 {
        assert!(graph.solve(&keys, random_seeds(&mut rng)).is_err());
    }
    Ok(())
}

#[test]
fn test_dimensions() -> Result<()> {
    let dims = GraphDimensions::new(1000, MaskFunction::And, DEFAULT_VERTEX_RATIO)?;
    assert_eq!(dims.num_edges(), 1024);
    assert_eq!(dims.num_vertices(), 2048);
    assert_eq!(dims.total_num_edges(), 2048);
    assert_eq!(dims.masking().index_size(), 1024);

    let dims = GraphDimensions::new(1000, MaskFunction::Modulus, DEFAULT_VERTEX_RATIO)?;
    assert_eq!(dims.num_edges(), 1000);
    assert_eq!(dims.num_vertices(), 2250);

    // FoldAuto is resolved according to the table size
    let dims = GraphDimensions::new(1000, MaskFunction::FoldAuto, DEFAULT_VERTEX_RATIO)?;
    assert_eq!(dims.masking().function(), MaskFunction::FoldOnce);

    assert!(matches!(
        GraphDimensions::new(0, MaskFunction::And, DEFAULT_VERTEX_RATIO),
        Err(BuildError::NoKeys)
    ));
    assert!(matches!(
        GraphDimensions::new(10, MaskFunction::Modulus, 1.0),
        Err(BuildError::InvalidVertexRatio(_))
    ));
    assert!(matches!(
        GraphDimensions::new(MAX_NUM_KEYS + 1, MaskFunction::Modulus, DEFAULT_VERTEX_RATIO),
        Err(BuildError::TooManyKeys(_))
    ));
    Ok(())
}

#[test]
fn test_resized() -> Result<()> {
    for mask_function in MaskFunction::ALL {
        let mut dims = GraphDimensions::new(100, mask_function, DEFAULT_VERTEX_RATIO)?;
        let num_edges = dims.num_edges();
        for _ in 0..5 {
            let resized = dims.resized()?;
            assert_eq!(resized.num_vertices(), dims.num_vertices() * 2);
            assert_eq!(resized.num_edges(), num_edges);
            assert_eq!(resized.num_keys(), 100);
            dims = resized;
        }
    }

    let dims = GraphDimensions::with_num_vertices(10, MaskFunction::And, 1 << 31)?;
    assert!(matches!(
        dims.resized(),
        Err(BuildError::TableSizeOverflow(_))
    ));
    Ok(())
}

#[test]
fn test_small_keys_sharing_low_bits() -> Result<()> {
    // 10 and 42 share their five lowest bits
    let keys = [10, 20, 30, 42];
    let mut rng = SmallRng::seed_from_u64(2);
    for hash_function in HashFunction::ALL {
        for mask_function in MaskFunction::ALL {
            let dims = GraphDimensions::new(keys.len(), mask_function, DEFAULT_VERTEX_RATIO)?;
            let masking = *dims.masking();
            let mut graph = Graph::try_new(dims, hash_function)?;

            let mut first_vary = false;
            let mut second_vary = false;
            let mut solved = false;
            for _ in 0..1000 {
                let seeds = random_seeds(&mut rng);
                let vertices = keys.map(|key| {
                    let [h1, h2] = hash_function.hash(key, &seeds);
                    (masking.mask_hash(h1), masking.mask_hash(h2))
                });
                first_vary |= vertices.iter().any(|v| v.0 != vertices[0].0);
                second_vary |= vertices.iter().any(|v| v.1 != vertices[0].1);
                solved |= graph.solve(&keys, seeds).is_ok();
            }
            assert!(first_vary, "{} {}", hash_function, mask_function);
            assert!(second_vary, "{} {}", hash_function, mask_function);
            assert!(solved, "{} {}", hash_function, mask_function);
        }
    }
    Ok(())
}
