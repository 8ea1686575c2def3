/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Offline search for latency-optimal trees.
//!
//! Trees in this module are lists of latency-matrix locations in position order, so `tree[0]` is the
//! root. The [cost function](cost::qc_latency) estimates how long the root needs to collect a quorum
//! certificate through a tree. Two searches use it:
//! - [Simulated annealing](annealing): fast local search from a latency-greedy starting tree.
//! - [Brute force](brute_force): exhaustive enumeration of structurally unique trees, for calibrating
//!   the annealing results on small trees.
//!
//! Both run one search per candidate root in parallel and keep the global minimum.

use std::{
    fmt::{self, Display, Formatter},
    num::ParseIntError,
};

use crate::types::data_types::Latency;

pub mod annealing;

pub mod brute_force;

pub mod cost;

/// The best tree a search found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizationResult {
    pub tree: Vec<usize>,
    pub latency: Latency,
    /// Number of trees the search evaluated with the cost function.
    pub analyzed_trees: u64,
}

impl OptimizationResult {
    /// Placeholder that any real tree improves upon.
    pub(crate) fn worst() -> Self {
        Self {
            tree: Vec::new(),
            latency: Latency::from_micros(u32::MAX),
            analyzed_trees: 0,
        }
    }

    /// Whether `self` should replace `best`. Ties are broken by the lexicographically smaller tree so
    /// that parallel searches give the same answer in every run.
    pub(crate) fn improves_on(&self, best: &OptimizationResult) -> bool {
        self.latency < best.latency || (self.latency == best.latency && self.tree < best.tree)
    }
}

impl Display for OptimizationResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "tree: {:?} has latency: {}", self.tree, self.latency)
    }
}

/// `tree` without `root`.
pub fn sub_tree_without_root(root: usize, tree: &[usize]) -> Vec<usize> {
    tree.iter().copied().filter(|location| *location != root).collect()
}

/// Parse a tree written as `[]int{1, 2, 3}`, `[1, 2, 3]`, `{1, 2, 3}`, or just `1, 2, 3`.
pub fn parse_tree_string(tree: &str) -> Result<Vec<usize>, ParseTreeError> {
    let trimmed = tree.trim();
    let trimmed = trimmed.strip_prefix("[]int").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('{').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('}').unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(']').unwrap_or(trimmed);

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .map(|location| location.parse::<usize>().map_err(ParseTreeError::from))
        .collect()
}

/// Number of structurally unique full trees of `n` nodes with branch factor `k`, over every choice of
/// root: `n * Π C(n - 1 - i·k, k)` for `i` in `0..=k`. This is the number of trees the brute force
/// search evaluates.
pub fn num_trees(n: usize, k: usize) -> u128 {
    if n == 0 {
        return 0;
    }
    let mut total = n as u128;
    for i in 0..=k {
        let remaining = (n - 1).saturating_sub(i * k);
        total *= binomial(remaining as u128, k as u128);
    }
    total
}

fn binomial(n: u128, k: u128) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Error returned by [`parse_tree_string`].
#[derive(Debug, PartialEq, Eq)]
pub struct ParseTreeError(ParseIntError);

impl From<ParseIntError> for ParseTreeError {
    fn from(value: ParseIntError) -> Self {
        ParseTreeError(value)
    }
}

/// Enumerates the ways in which an optimizer call can be invalid.
#[derive(Debug, PartialEq, Eq)]
pub enum OptimizerError {
    /// The branch factor must be at least 1.
    ZeroBranchFactor,

    /// The tree cannot hold a root and a full tier of internal nodes.
    TreeTooSmall { size: usize, branch_factor: usize },

    /// The tree mentions a location the latency matrix does not have.
    UnknownLocation { location: usize, matrix_size: usize },

    /// The requested root is not part of the tree.
    RootNotInTree { root: usize },
}

pub(crate) fn validate_tree(
    tree: &[usize],
    branch_factor: usize,
    matrix_size: usize,
) -> Result<(), OptimizerError> {
    if branch_factor == 0 {
        return Err(OptimizerError::ZeroBranchFactor);
    }
    if tree.len() < branch_factor + 1 {
        return Err(OptimizerError::TreeTooSmall {
            size: tree.len(),
            branch_factor,
        });
    }
    if let Some(location) = tree.iter().find(|location| **location >= matrix_size) {
        return Err(OptimizerError::UnknownLocation {
            location: *location,
            matrix_size,
        });
    }
    Ok(())
}
