/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The cost function: how long it takes the root of a tree to collect a quorum certificate.
//!
//! The tree is a list of locations in position order (see [`TreeTopology`](crate::tree::topology)).
//! Only the first three levels are modelled: the root, its `B` children (the internal nodes), and
//! each internal node's `B` children (the leaves). Timing is simulated in two phases:
//!
//! 1. Dissemination, top-down: an internal node receives the proposal after the root→internal path
//!    latency, and a leaf after a further internal→leaf latency. Leaves vote as soon as they receive
//!    the proposal.
//! 2. Aggregation, bottom-up: an internal node has aggregated once it has received its own proposal
//!    and the votes of all of its leaves, and its aggregate is delivered to the root one path latency
//!    later.
//!
//! The root then takes internal aggregates in order of delivery until it holds a quorum of votes.

use crate::{
    tree::{latency::LatencyMatrix, topology::TreeTopology},
    types::data_types::Latency,
};

/// Simulated state of one node of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub location: usize,
    /// Votes held by this node once it has aggregated: its own plus its leaves'.
    pub votes: usize,
    /// When the proposal reached this node.
    pub disseminated: Latency,
    /// When this node finished aggregating.
    pub aggregated: Latency,
    /// When this node's aggregate reached its parent.
    pub delivered: Latency,
}

impl TreeNode {
    pub fn new(location: usize) -> Self {
        Self {
            location,
            votes: 1,
            disseminated: Latency::ZERO,
            aggregated: Latency::ZERO,
            delivered: Latency::ZERO,
        }
    }
}

pub fn as_nodes(tree: &[usize]) -> Vec<TreeNode> {
    tree.iter().map(|location| TreeNode::new(*location)).collect()
}

/// The locations of `nodes`, in order.
pub fn as_tree(nodes: &[TreeNode]) -> Vec<usize> {
    nodes.iter().map(|node| node.location).collect()
}

/// Reuse `nodes` for a tree rooted at `root` with the non-root positions `rest`, without
/// reallocating.
pub fn reset_nodes(nodes: &mut [TreeNode], root: usize, rest: &[usize]) {
    nodes[0] = TreeNode::new(root);
    for (node, location) in nodes[1..].iter_mut().zip(rest) {
        *node = TreeNode::new(*location);
    }
}

/// Latency for the root of `all` to collect `quorum_size` votes.
///
/// As a side effect, the internal nodes of `all` (and, for full trees, their leaf blocks) are
/// reordered by ascending delivery time. The reordered tree has the same latency as the original.
pub fn qc_latency(
    latencies: &LatencyMatrix,
    quorum_size: usize,
    branch_factor: usize,
    all: &mut [TreeNode],
) -> Latency {
    let Some((root, nodes)) = all.split_first_mut() else {
        return Latency::ZERO;
    };
    let mut root = *root;
    let internal_count = branch_factor.min(nodes.len());

    for i in 0..internal_count {
        nodes[i].disseminated =
            root.disseminated + latencies.latency(root.location, nodes[i].location);
        for j in 0..branch_factor {
            let leaf = branch_factor * i + j + branch_factor;
            if leaf >= nodes.len() {
                break;
            }
            nodes[leaf].disseminated =
                nodes[i].disseminated + latencies.latency(nodes[i].location, nodes[leaf].location);
            nodes[leaf].aggregated = nodes[leaf].disseminated;
            nodes[leaf].delivered =
                nodes[leaf].aggregated + latencies.latency(nodes[leaf].location, nodes[i].location);
        }
    }

    for i in 0..internal_count {
        nodes[i].aggregated = nodes[i].disseminated;
        for j in 0..branch_factor {
            let leaf = branch_factor * i + j + branch_factor;
            if leaf >= nodes.len() {
                break;
            }
            nodes[i].aggregated = nodes[i].aggregated.max(nodes[leaf].delivered);
            nodes[i].votes += nodes[leaf].votes;
        }
        nodes[i].delivered =
            nodes[i].aggregated + latencies.latency(nodes[i].location, root.location);
    }

    order_by_latency(branch_factor, internal_count, nodes);

    for internal in &nodes[..internal_count] {
        if root.votes >= quorum_size {
            return root.aggregated;
        }
        root.aggregated = root.aggregated.max(internal.delivered);
        root.votes += internal.votes;
    }
    root.aggregated
}

/// Convenience wrapper around [`qc_latency`] for a tree given as a list of locations.
pub fn tree_qc_latency(
    latencies: &LatencyMatrix,
    quorum_size: usize,
    branch_factor: usize,
    tree: &[usize],
) -> Latency {
    qc_latency(latencies, quorum_size, branch_factor, &mut as_nodes(tree))
}

/// Sort the internal nodes by delivery time. For full trees, move each internal node's leaf block
/// along with it, so that the result is still a tree with the same parent-child edges.
fn order_by_latency(branch_factor: usize, internal_count: usize, nodes: &mut [TreeNode]) {
    let original = nodes[..internal_count].to_vec();
    nodes[..internal_count].sort_by_key(|node| node.delivered);
    if nodes[..internal_count] == original[..] {
        return;
    }

    if nodes.len() + 1 != TreeTopology::tree_size(branch_factor) {
        return;
    }
    let source = nodes.to_vec();
    for (from, moved) in original.iter().enumerate() {
        let Some(to) = nodes[..internal_count]
            .iter()
            .position(|node| node.location == moved.location)
        else {
            continue;
        };
        let (from_start, to_start) = (leaf_block_start(from, branch_factor), leaf_block_start(to, branch_factor));
        nodes[to_start..to_start + branch_factor]
            .copy_from_slice(&source[from_start..from_start + branch_factor]);
    }
}

fn leaf_block_start(internal: usize, branch_factor: usize) -> usize {
    branch_factor * internal + branch_factor
}
