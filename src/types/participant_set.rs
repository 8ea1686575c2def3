/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Ordered set of participant identities.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::ReplicaID;

/// Set of [`ReplicaID`]s kept in ascending order, so that iteration over it is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ParticipantSet(BTreeSet<ReplicaID>);

impl ParticipantSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Insert `replica`. Returns whether the replica was newly inserted.
    pub fn insert(&mut self, replica: ReplicaID) -> bool {
        self.0.insert(replica)
    }

    pub fn remove(&mut self, replica: &ReplicaID) -> bool {
        self.0.remove(replica)
    }

    pub fn contains(&self, replica: &ReplicaID) -> bool {
        self.0.contains(replica)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_disjoint(&self, other: &ParticipantSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn is_superset<'a>(&self, replicas: impl IntoIterator<Item = &'a ReplicaID>) -> bool {
        replicas.into_iter().all(|replica| self.0.contains(replica))
    }

    pub fn union(&self, other: &ParticipantSet) -> ParticipantSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicaID> {
        self.0.iter()
    }
}

impl FromIterator<ReplicaID> for ParticipantSet {
    fn from_iter<T: IntoIterator<Item = ReplicaID>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ParticipantSet {
    type Item = ReplicaID;
    type IntoIter = std::collections::btree_set::IntoIter<ReplicaID>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
