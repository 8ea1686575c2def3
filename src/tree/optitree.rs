/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Robust tree construction from a suspicion graph.
//!
//! A suspicion between two replicas means that at least one of them is probably faulty, but not which
//! one. [`robust_internal_nodes`] picks the replicas that are safe to use as internal (aggregating)
//! nodes, and [`OptiTree`] builds a tree around them, attaching every other replica as a leaf of the
//! internal node nearest to it.
//!
//! ## Robust set
//!
//! 1. Build `MG1`, a matching over the suspicion graph: edges are visited in ascending order of their
//!    endpoints, and an edge is kept only if neither endpoint already has degree 1 in `MG1`.
//! 2. For each kept edge `(a, b)`: if `a` and `b` each have a distinct neighbor of suspicion degree 1
//!    that is still unmatched, replace `(a, b)` with those two edges. This grows the matching.
//! 3. Unmatched nodes are candidates. A candidate `v` that is suspected by `a` and suspects `b` for a
//!    matched pair `(a, b)` is dropped, since it could relay for either side.
//! 4. If one endpoint of a matched pair has suspicion degree 1 (its only conflict is with its partner)
//!    while the partner conflicts with several replicas, the partner alone is blamed and the cornered
//!    endpoint is added back.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    membership::Membership,
    types::data_types::{Latency, ReplicaID},
};

use super::topology::{TopologyError, TreeTopology};

/// Directed suspicion counts between replicas. `suspects(a, b)` is the number of times `a` reported
/// `b`. Adjacency and degree treat the graph as undirected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuspicionGraph {
    nodes: BTreeSet<ReplicaID>,
    counts: BTreeMap<ReplicaID, BTreeMap<ReplicaID, u32>>,
}

impl SuspicionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph over `nodes` with no suspicions.
    pub fn with_nodes(nodes: impl IntoIterator<Item = ReplicaID>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            counts: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, node: ReplicaID) {
        self.nodes.insert(node);
    }

    /// Record one more report by `suspecter` against `suspect`. Self-suspicions are ignored.
    pub fn add_suspicion(&mut self, suspecter: ReplicaID, suspect: ReplicaID) {
        self.add_suspicions(suspecter, suspect, 1)
    }

    pub fn add_suspicions(&mut self, suspecter: ReplicaID, suspect: ReplicaID, count: u32) {
        if suspecter == suspect || count == 0 {
            return;
        }
        self.nodes.insert(suspecter);
        self.nodes.insert(suspect);
        *self
            .counts
            .entry(suspecter)
            .or_default()
            .entry(suspect)
            .or_default() += count;
    }

    pub fn suspects(&self, suspecter: &ReplicaID, suspect: &ReplicaID) -> u32 {
        self.counts
            .get(suspecter)
            .and_then(|suspects| suspects.get(suspect))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_adjacent(&self, a: &ReplicaID, b: &ReplicaID) -> bool {
        self.suspects(a, b) > 0 || self.suspects(b, a) > 0
    }

    /// Replicas that `node` suspects or is suspected by, in ascending order.
    pub fn neighbors(&self, node: &ReplicaID) -> BTreeSet<ReplicaID> {
        let mut neighbors: BTreeSet<ReplicaID> = self
            .counts
            .get(node)
            .map(|suspects| suspects.keys().copied().collect())
            .unwrap_or_default();
        neighbors.extend(
            self.counts
                .iter()
                .filter(|(_, suspects)| suspects.contains_key(node))
                .map(|(suspecter, _)| *suspecter),
        );
        neighbors
    }

    pub fn degree(&self, node: &ReplicaID) -> usize {
        self.neighbors(node).len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ReplicaID> {
        self.nodes.iter()
    }

    /// Every `(suspecter, suspect, count)` triple, ordered by suspecter then suspect.
    pub fn suspicions(&self) -> impl Iterator<Item = (ReplicaID, ReplicaID, u32)> + '_ {
        self.counts.iter().flat_map(|(suspecter, suspects)| {
            suspects
                .iter()
                .map(move |(suspect, count)| (*suspecter, *suspect, *count))
        })
    }
}

/// Undirected graph in which every node has degree 0 or 1.
#[derive(Default)]
struct Matching {
    partner: BTreeMap<ReplicaID, ReplicaID>,
}

impl Matching {
    fn is_matched(&self, node: &ReplicaID) -> bool {
        self.partner.contains_key(node)
    }

    fn add(&mut self, a: ReplicaID, b: ReplicaID) {
        self.partner.insert(a, b);
        self.partner.insert(b, a);
    }

    fn remove(&mut self, a: &ReplicaID, b: &ReplicaID) {
        self.partner.remove(a);
        self.partner.remove(b);
    }

    /// Each matched pair once, as `(smaller, larger)`.
    fn edges(&self) -> Vec<(ReplicaID, ReplicaID)> {
        self.partner
            .iter()
            .filter(|(a, b)| a < b)
            .map(|(a, b)| (*a, *b))
            .collect()
    }
}

/// The replicas of `graph` that are safe to use as internal nodes, in ascending order. See the
/// [module documentation](self) for the procedure.
pub fn robust_internal_nodes(graph: &SuspicionGraph) -> Vec<ReplicaID> {
    let mut matching = Matching::default();
    for a in graph.nodes() {
        for b in graph.neighbors(a) {
            if !matching.is_matched(a) && !matching.is_matched(&b) {
                matching.add(*a, b);
            }
        }
    }

    for (a, b) in matching.edges() {
        let cornered_neighbor = |node: &ReplicaID, exclude: &[ReplicaID], matching: &Matching| {
            graph.neighbors(node).into_iter().find(|neighbor| {
                !exclude.contains(neighbor)
                    && graph.degree(neighbor) == 1
                    && !matching.is_matched(neighbor)
            })
        };
        let Some(x) = cornered_neighbor(&a, &[b], &matching) else {
            continue;
        };
        let Some(y) = cornered_neighbor(&b, &[a, x], &matching) else {
            continue;
        };
        matching.remove(&a, &b);
        matching.add(a, x);
        matching.add(b, y);
    }

    let edges = matching.edges();
    let mut robust: BTreeSet<ReplicaID> = graph
        .nodes()
        .filter(|node| !matching.is_matched(node))
        .copied()
        .collect();
    robust.retain(|v| {
        !edges.iter().any(|(a, b)| {
            (graph.suspects(a, v) > 0 && graph.suspects(v, b) > 0)
                || (graph.suspects(b, v) > 0 && graph.suspects(v, a) > 0)
        })
    });

    for (a, b) in edges {
        match (graph.degree(&a), graph.degree(&b)) {
            (1, degree_b) if degree_b > 1 => {
                robust.insert(a);
            }
            (degree_a, 1) if degree_a > 1 => {
                robust.insert(b);
            }
            _ => (),
        }
    }

    robust.into_iter().collect()
}

/// Builds trees whose internal nodes are robust, for the replica `me`.
pub struct OptiTree<'a, M: Membership> {
    me: ReplicaID,
    branch_factor: usize,
    membership: &'a M,
}

impl<'a, M: Membership> OptiTree<'a, M> {
    pub fn new(me: ReplicaID, branch_factor: usize, membership: &'a M) -> Self {
        Self {
            me,
            branch_factor,
            membership,
        }
    }

    /// The root followed by the first tier of internal nodes: `branch_factor + 1` replicas (or fewer
    /// if the replica set is smaller).
    ///
    /// Robust replicas are preferred. If there are not enough of them, the whole replica set is used
    /// instead. When `me` is a candidate, candidates are ordered by latency from `me`, and `me` is
    /// put first.
    pub fn internal_set(&self, suspicions: &SuspicionGraph) -> Vec<ReplicaID> {
        let replicas = self.membership.replicas();
        let mut graph = suspicions.clone();
        replicas.iter().for_each(|replica| graph.add_node(*replica));

        let robust: Vec<ReplicaID> = robust_internal_nodes(&graph)
            .into_iter()
            .filter(|node| replicas.contains(node))
            .collect();
        let mut candidates = if robust.len() > self.branch_factor {
            robust
        } else {
            log::debug!(
                "Only {} robust replicas, falling back to the full replica set",
                robust.len()
            );
            replicas
        };

        if let Some(position) = candidates.iter().position(|node| *node == self.me) {
            candidates.remove(position);
            candidates.sort_by_key(|node| (self.membership.latency(&self.me, node), *node));
            candidates.insert(0, self.me);
        }
        candidates.truncate(self.branch_factor + 1);
        candidates
    }

    /// Build a tree whose root and first tier are [`internal_set`](Self::internal_set), with every other
    /// replica attached as a leaf by [`assign_leaves`].
    pub fn tree(&self, suspicions: &SuspicionGraph) -> Result<TreeTopology, TopologyError> {
        let internal = self.internal_set(suspicions);
        let positions = assign_leaves(self.membership, self.branch_factor, internal);
        TreeTopology::new(self.branch_factor, positions)
    }
}

/// Extend `internal` (root first) into a full position list. For each position after the root, in
/// order, up to `branch_factor` unplaced replicas are attached as its children, always taking the
/// replica nearest to it. Placed replicas are never moved again.
pub fn assign_leaves<M: Membership>(
    membership: &M,
    branch_factor: usize,
    internal: Vec<ReplicaID>,
) -> Vec<ReplicaID> {
    let mut positions = internal;
    let mut unplaced: Vec<ReplicaID> = membership
        .replicas()
        .into_iter()
        .filter(|replica| !positions.contains(replica))
        .collect();

    let mut parent = 1;
    while !unplaced.is_empty() && parent < positions.len() {
        let parent_id = positions[parent];
        for _ in 0..branch_factor {
            let Some(nearest) = membership.find_nearest(&parent_id, &unplaced) else {
                break;
            };
            unplaced.retain(|replica| *replica != nearest);
            positions.push(nearest);
        }
        parent += 1;
    }

    // Only reachable with a root-only internal set.
    positions.extend(unplaced);
    positions
}

/// Total latency of all parent-child edges of `tree`.
pub fn total_edge_latency<M: Membership>(membership: &M, tree: &TreeTopology) -> Latency {
    tree.identities()
        .iter()
        .filter_map(|node| {
            tree.parent(node)
                .map(|parent| membership.latency(&parent, node))
        })
        .sum()
}
