/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exhaustive search over structurally unique trees.
//!
//! Two trees that differ only in the order of the nodes inside a sibling group have the same QC
//! latency, so [`unique_trees`] only generates permutations where every group of `B` consecutive
//! non-root positions is sorted. A full tree of `n` nodes then has [`num_trees`](super::num_trees)
//! candidates over all roots.
//!
//! The search runs one thread per root. The per-root results are merged either by a collector that
//! drains a channel ([`optimal_tree_channel`]) or under a mutex that every thread updates as soon as
//! it beats the global best ([`optimal_tree_mutex`]). Both give the same result.

use std::{
    sync::{mpsc, Mutex, PoisonError},
    thread,
};

use crate::{membership::quorum_size, tree::latency::LatencyMatrix};

use super::{
    cost::{as_nodes, as_tree, qc_latency, reset_nodes},
    sub_tree_without_root, validate_tree, OptimizationResult, OptimizerError,
};

/// Call `eval` with every permutation of `tree` in which each consecutive group of `branch_factor`
/// entries is ascending. `tree` holds the non-root positions and must itself be sorted.
pub fn unique_trees(tree: &[usize], branch_factor: usize, mut eval: impl FnMut(&[usize])) {
    if branch_factor == 0 {
        return;
    }
    let mut permutation = vec![0; tree.len()];
    let mut used = vec![false; tree.len()];
    visit(0, tree, &mut permutation, &mut used, branch_factor, &mut eval);
}

fn visit(
    position: usize,
    tree: &[usize],
    permutation: &mut [usize],
    used: &mut [bool],
    branch_factor: usize,
    eval: &mut impl FnMut(&[usize]),
) {
    if position >= tree.len() {
        eval(permutation);
        return;
    }

    let group_start = position - position % branch_factor;
    for i in 0..tree.len() {
        if used[i] {
            continue;
        }
        if position > group_start && permutation[position - 1] > tree[i] {
            continue;
        }
        used[i] = true;
        permutation[position] = tree[i];
        visit(position + 1, tree, permutation, used, branch_factor, eval);
        used[i] = false;
    }
}

/// Best tree over every root in `base_tree` and every unique arrangement of the remaining nodes.
/// Per-root results are sent over a channel to a single collector.
pub fn optimal_tree_channel(
    latencies: &LatencyMatrix,
    base_tree: &[usize],
    branch_factor: usize,
) -> Result<OptimizationResult, OptimizerError> {
    validate_tree(base_tree, branch_factor, latencies.size())?;
    let quorum = quorum_size(base_tree.len());

    let (results, collector) = mpsc::channel();
    thread::scope(|scope| {
        for &root in base_tree {
            let results = results.clone();
            scope.spawn(move || {
                let _ = results.send(best_for_root(latencies, base_tree, root, branch_factor, quorum));
            });
        }
    });
    drop(results);

    let mut optimal = OptimizationResult::worst();
    let mut analyzed_trees = 0;
    for result in collector {
        analyzed_trees += result.analyzed_trees;
        if result.improves_on(&optimal) {
            optimal = result;
        }
    }
    optimal.analyzed_trees = analyzed_trees;
    Ok(optimal)
}

/// Same search as [`optimal_tree_channel`], but every thread updates a shared, mutex-guarded best
/// result whenever it finds a tree that beats its own best so far.
pub fn optimal_tree_mutex(
    latencies: &LatencyMatrix,
    base_tree: &[usize],
    branch_factor: usize,
) -> Result<OptimizationResult, OptimizerError> {
    validate_tree(base_tree, branch_factor, latencies.size())?;
    let quorum = quorum_size(base_tree.len());
    let optimal = Mutex::new(OptimizationResult::worst());

    thread::scope(|scope| {
        for &root in base_tree {
            let optimal = &optimal;
            scope.spawn(move || {
                let mut rest = sub_tree_without_root(root, base_tree);
                rest.sort_unstable();
                let mut nodes = as_nodes(base_tree);
                let mut local_best = OptimizationResult::worst();
                let mut analyzed_trees = 0;

                unique_trees(&rest, branch_factor, |permutation| {
                    reset_nodes(&mut nodes, root, permutation);
                    let latency = qc_latency(latencies, quorum, branch_factor, &mut nodes);
                    analyzed_trees += 1;
                    if latency > local_best.latency {
                        return;
                    }
                    let candidate = OptimizationResult {
                        tree: as_tree(&nodes),
                        latency,
                        analyzed_trees: 0,
                    };
                    if !candidate.improves_on(&local_best) {
                        return;
                    }

                    let mut optimal = optimal.lock().unwrap_or_else(PoisonError::into_inner);
                    if candidate.improves_on(&optimal) {
                        optimal.tree = candidate.tree.clone();
                        optimal.latency = candidate.latency;
                        local_best = candidate;
                    } else {
                        // Another root already holds something at least as good.
                        local_best.latency = optimal.latency;
                        local_best.tree = optimal.tree.clone();
                    }
                });

                optimal
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .analyzed_trees += analyzed_trees;
            });
        }
    });

    Ok(optimal.into_inner().unwrap_or_else(PoisonError::into_inner))
}

fn best_for_root(
    latencies: &LatencyMatrix,
    base_tree: &[usize],
    root: usize,
    branch_factor: usize,
    quorum: usize,
) -> OptimizationResult {
    let mut rest = sub_tree_without_root(root, base_tree);
    rest.sort_unstable();
    let mut nodes = as_nodes(base_tree);
    let mut best = OptimizationResult::worst();
    let mut analyzed_trees = 0;

    unique_trees(&rest, branch_factor, |permutation| {
        reset_nodes(&mut nodes, root, permutation);
        let latency = qc_latency(latencies, quorum, branch_factor, &mut nodes);
        analyzed_trees += 1;
        if latency <= best.latency {
            let candidate = OptimizationResult {
                tree: as_tree(&nodes),
                latency,
                analyzed_trees: 0,
            };
            if candidate.improves_on(&best) {
                best = candidate;
            }
        }
    });

    log::debug!("Root {} analyzed {} trees, best: {}", root, analyzed_trees, best);
    best.analyzed_trees = analyzed_trees;
    best
}
