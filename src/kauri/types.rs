/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types specific to the Kauri protocol.

use std::time::Instant;

use crate::types::{
    certificates::QuorumCertificate,
    crypto_primitives::QuorumSignature,
    data_types::{CryptoHash, ReplicaID, ViewNumber},
    participant_set::ParticipantSet,
};

/// How a replica picks the tree for view 1 and for every tree change after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeStrategy {
    /// Cycle through seeded random partitions of `branch_factor + 1` replicas. The current partition
    /// takes the root and first tier. The rest of the replicas follow in ascending order.
    Random,

    /// Cycle through latency-clustered committees of `branch_factor + 1` replicas. The current
    /// committee takes the root and first tier, and every other replica is attached to its nearest
    /// internal node.
    Committees,

    /// Build the tree with [`OptiTree`](crate::tree::optitree::OptiTree) over the committed
    /// suspicions.
    Robust,
}

/// The aggregation state of the view a replica is currently in. Replaced on every
/// [`begin`](super::implementation::Kauri::begin).
#[derive(Clone, Debug)]
pub struct ViewState {
    pub(crate) view: ViewNumber,
    pub(crate) block: CryptoHash,
    pub(crate) aggregate: QuorumSignature,
    pub(crate) senders: ParticipantSet,
    pub(crate) aggregation_sent: bool,
    pub(crate) quorum_certificate: Option<QuorumCertificate>,
    pub(crate) deadline: Option<Instant>,
}

impl ViewState {
    /// State for a view in which the local replica has so far only its own vote.
    pub(crate) fn new(view: ViewNumber, block: CryptoHash, own_vote: QuorumSignature) -> Self {
        Self {
            view,
            block,
            aggregate: own_vote,
            senders: ParticipantSet::new(),
            aggregation_sent: false,
            quorum_certificate: None,
            deadline: None,
        }
    }

    pub fn view(&self) -> ViewNumber {
        self.view
    }

    pub fn block(&self) -> CryptoHash {
        self.block
    }

    /// Everything aggregated so far, including the local vote.
    pub fn aggregate(&self) -> &QuorumSignature {
        &self.aggregate
    }

    /// Replicas whose contributions have been merged into the aggregate.
    pub fn senders(&self) -> &ParticipantSet {
        &self.senders
    }

    /// Whether the aggregate has been forwarded to the parent. For the root, whether aggregation has
    /// ended.
    pub fn aggregation_sent(&self) -> bool {
        self.aggregation_sent
    }

    /// The quorum certificate, once the aggregate reached the quorum size of the view.
    pub fn quorum_certificate(&self) -> Option<&QuorumCertificate> {
        self.quorum_certificate.as_ref()
    }

    /// Identities in `required` that are missing from the aggregate.
    pub(crate) fn missing(&self, required: &[ReplicaID]) -> Vec<ReplicaID> {
        let participants = self.aggregate.participants();
        required
            .iter()
            .filter(|id| !participants.contains(id))
            .copied()
            .collect()
    }
}
