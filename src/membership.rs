/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable view of the replica set: who participates, how far apart they are, how many votes make
//! a quorum, and who leads each view.
//!
//! Kauri consumes membership only through the [`Membership`] and [`LeaderRotation`] traits. This
//! module also provides [`StaticMembership`], an implementation for a fixed replica set whose
//! latencies are given by a [`LatencyMatrix`], and [`RoundRobin`] leader rotation.

use std::collections::HashMap;

use typed_builder::TypedBuilder;

use crate::{
    tree::latency::LatencyMatrix,
    types::data_types::{Latency, ReplicaID, ViewNumber},
};

/// Number of votes in a quorum for `n` participants: `ceil((n + f + 1) / 2)` where `f = (n - 1) / 3`
/// is the number of tolerated faults.
pub fn quorum_size(n: usize) -> usize {
    let f = n.saturating_sub(1) / 3;
    (n + f + 2) / 2
}

/// The replica set, as seen by Kauri.
pub trait Membership: Send {
    /// All participants, in ascending order.
    fn replicas(&self) -> Vec<ReplicaID>;

    fn size(&self) -> usize {
        self.replicas().len()
    }

    /// Number of votes that make a quorum certificate in `view`.
    fn quorum_size(&self, view: ViewNumber) -> usize;

    /// Randomness that every participant agrees on.
    fn shared_random_seed(&self) -> u64;

    /// One-way latency between two participants.
    fn latency(&self, from: &ReplicaID, to: &ReplicaID) -> Latency;

    /// The participant in `candidates` (other than `from` itself) with the lowest latency from `from`.
    /// Ties go to the candidate that comes first.
    fn find_nearest(&self, from: &ReplicaID, candidates: &[ReplicaID]) -> Option<ReplicaID> {
        let mut nearest: Option<(ReplicaID, Latency)> = None;
        for candidate in candidates.iter().filter(|candidate| *candidate != from) {
            let latency = self.latency(from, candidate);
            if nearest.map_or(true, |(_, best)| latency < best) {
                nearest = Some((*candidate, latency));
            }
        }
        nearest.map(|(candidate, _)| candidate)
    }

    /// Split the replica set into as many disjoint committees of exactly `size` members as it allows.
    fn committees_of_size(&self, size: usize) -> Vec<Vec<ReplicaID>>;
}

/// Decides the leader of every view.
pub trait LeaderRotation: Send {
    fn leader(&self, view: ViewNumber) -> ReplicaID;
}

/// Leaders take turns in ascending order of identity.
#[derive(Clone)]
pub struct RoundRobin {
    replicas: Vec<ReplicaID>,
}

impl RoundRobin {
    pub fn new(mut replicas: Vec<ReplicaID>) -> Self {
        replicas.sort();
        Self { replicas }
    }
}

impl LeaderRotation for RoundRobin {
    fn leader(&self, view: ViewNumber) -> ReplicaID {
        if self.replicas.is_empty() {
            return ReplicaID::default();
        }
        self.replicas[(view.int() % self.replicas.len() as u64) as usize]
    }
}

/// Membership of a fixed replica set.
///
/// Each replica sits at a location of the latency matrix. Unless a location is set explicitly with
/// `.locations(...)`, replica `i` sits at location `i - 1`. Latencies involving a location outside the
/// matrix are treated as unreachable ([`u32::MAX`] microseconds).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [StaticMembership]. On the builder call the following methods to construct a valid [StaticMembership].
    Required:
    - `.replicas(...)`
    - `.latencies(...)`
    Optional:
    - `.locations(...)`
    - `.seed(...)`
    - `.quorum_overrides(...)`
"))]
pub struct StaticMembership {
    #[builder(setter(
        transform = |replicas: impl IntoIterator<Item = ReplicaID>| {
            let mut replicas: Vec<ReplicaID> = replicas.into_iter().collect();
            replicas.sort();
            replicas.dedup();
            replicas
        },
        doc = "Set the participants. Required."
    ))]
    replicas: Vec<ReplicaID>,

    #[builder(setter(doc = "Set the latency matrix over locations. Required."))]
    latencies: LatencyMatrix,

    #[builder(default, setter(doc = "Set the location of each replica in the latency matrix. Optional."))]
    locations: HashMap<ReplicaID, usize>,

    #[builder(default, setter(doc = "Set the shared random seed. Optional, defaults to 0."))]
    seed: u64,

    #[builder(default, setter(doc = "Set per-view quorum sizes that replace the default quorum. Optional."))]
    quorum_overrides: HashMap<ViewNumber, usize>,
}

impl StaticMembership {
    pub fn location(&self, replica: &ReplicaID) -> usize {
        self.locations
            .get(replica)
            .copied()
            .unwrap_or_else(|| (replica.int() as usize).saturating_sub(1))
    }

    pub fn latencies(&self) -> &LatencyMatrix {
        &self.latencies
    }

    /// Use `quorum_size` votes as the quorum of `view`, instead of the default quorum.
    pub fn set_quorum_override(&mut self, view: ViewNumber, quorum_size: usize) {
        self.quorum_overrides.insert(view, quorum_size);
    }
}

impl Membership for StaticMembership {
    fn replicas(&self) -> Vec<ReplicaID> {
        self.replicas.clone()
    }

    fn size(&self) -> usize {
        self.replicas.len()
    }

    fn quorum_size(&self, view: ViewNumber) -> usize {
        self.quorum_overrides
            .get(&view)
            .copied()
            .unwrap_or_else(|| quorum_size(self.replicas.len()))
    }

    fn shared_random_seed(&self) -> u64 {
        self.seed
    }

    fn latency(&self, from: &ReplicaID, to: &ReplicaID) -> Latency {
        let (from, to) = (self.location(from), self.location(to));
        if from >= self.latencies.size() || to >= self.latencies.size() {
            return Latency::from_micros(u32::MAX);
        }
        self.latencies.latency(from, to)
    }

    /// Committees are clustered by latency. Each committee is seeded with the smallest identity not yet
    /// in a committee, and then repeatedly takes the unassigned replica nearest to that seed, so replicas
    /// that share a location end up together.
    fn committees_of_size(&self, size: usize) -> Vec<Vec<ReplicaID>> {
        let mut committees = Vec::new();
        if size == 0 {
            return committees;
        }

        let mut unassigned = self.replicas.clone();
        while unassigned.len() >= size {
            let seed = unassigned.remove(0);
            let mut committee = vec![seed];
            while committee.len() < size {
                let Some(nearest) = self.find_nearest(&seed, &unassigned) else {
                    break;
                };
                unassigned.retain(|replica| *replica != nearest);
                committee.push(nearest);
            }
            committees.push(committee);
        }
        committees
    }
}
