/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::io;

use crate::types::data_types::ReplicaID;

use super::messages::{Contribution, Message, Proposal};

pub trait Network: Send {
    /// Send `proposal` to every replica in `peers` without blocking. Fails without sending anything if
    /// the group cannot be formed, for example because a peer is unknown.
    fn send_proposal(&mut self, peers: &[ReplicaID], proposal: Proposal) -> Result<(), NetworkError>;

    /// Send `contribution` to `peer` without blocking.
    fn send_contribution(
        &mut self,
        peer: ReplicaID,
        contribution: Contribution,
    ) -> Result<(), NetworkError>;

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(ReplicaID, Message)>;
}

/// Enumerates the ways in which a send can fail.
#[derive(Debug)]
pub enum NetworkError {
    /// The network has no connection to this replica.
    UnknownPeer(ReplicaID),

    /// A proposal was addressed to an empty group.
    EmptyGroup,

    /// The message could not be serialized.
    Serialization(io::Error),

    /// The connection to the peer is closed.
    Disconnected(ReplicaID),
}

impl From<io::Error> for NetworkError {
    fn from(value: io::Error) -> Self {
        NetworkError::Serialization(value)
    }
}
