/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between replicas during a view.

use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    crypto_primitives::QuorumSignature,
    data_types::{ReplicaID, ViewNumber},
};

/// All message variants sent over the [`Network`](super::network::Network).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// See [`Proposal`].
    Proposal(Proposal),

    /// See [`Contribution`].
    Contribution(Contribution),
}

impl Message {
    pub fn view(&self) -> ViewNumber {
        match self {
            Message::Proposal(proposal) => proposal.view,
            Message::Contribution(contribution) => contribution.view,
        }
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        self.try_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Message> {
        Message::try_from_slice(bytes)
    }
}

impl From<Proposal> for Message {
    fn from(value: Proposal) -> Self {
        Message::Proposal(value)
    }
}

impl From<Contribution> for Message {
    fn from(value: Contribution) -> Self {
        Message::Contribution(value)
    }
}

/// A block proposed for `view`, disseminated from the root down the tree.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub view: ViewNumber,
    pub block: Block,
}

/// The aggregate a replica forwards to its parent: the signatures of itself and of the part of its
/// subtree that reported in time.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Contribution {
    /// The sender.
    pub id: ReplicaID,
    pub signature: QuorumSignature,
    pub view: ViewNumber,
}
