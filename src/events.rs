/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events emitted by a Kauri replica, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are sent from the
//! protocol thread to the [event bus](crate::event_bus) thread, which passes them to the default
//! [loggers](crate::logging) and to the handlers registered in [`ReplicaSpec`](crate::replica::ReplicaSpec).

use std::{
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use crate::{
    kauri::TreeStrategy,
    networking::messages::{Contribution, Proposal},
    ranking::complaint::Complaint,
    types::{
        certificates::QuorumCertificate,
        data_types::{CryptoHash, ReplicaID, ViewNumber},
    },
};

pub enum Event {
    StartView(StartViewEvent),
    Disseminate(DisseminateEvent),
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveContribution(ReceiveContributionEvent),
    RejectContribution(RejectContributionEvent),
    SendContribution(SendContributionEvent),
    CollectQC(CollectQCEvent),
    AggregationTimeout(AggregationTimeoutEvent),
    ChangeTree(ChangeTreeEvent),
    AddComplaint(AddComplaintEvent),
}

impl Event {
    /// Send `event` to the event bus, if there is one. A closed event bus is not an error: it only
    /// means the replica is shutting down.
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// The replica began a view with the given tree.
pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub leader: ReplicaID,
    /// The tree used for this view, in position order.
    pub tree: Vec<ReplicaID>,
}

/// The replica sent the proposal to its children.
pub struct DisseminateEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
    pub children: Vec<ReplicaID>,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub proposal: Proposal,
}

/// A contribution was verified and merged into the aggregate.
pub struct ReceiveContributionEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub contribution: Contribution,
}

/// A contribution failed verification or overlapped with the aggregate, and was dropped.
pub struct RejectContributionEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub contribution: Contribution,
}

/// The replica forwarded its aggregate to its parent.
pub struct SendContributionEvent {
    pub timestamp: SystemTime,
    pub parent: ReplicaID,
    pub contribution: Contribution,
}

/// The aggregate reached the quorum size of its view.
pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_certificate: QuorumCertificate,
}

/// The aggregation deadline passed before the whole subtree contributed.
pub struct AggregationTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub timeout: Duration,
    pub missing: Vec<ReplicaID>,
}

/// The replica built a new tree.
pub struct ChangeTreeEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub block: CryptoHash,
    pub strategy: TreeStrategy,
    pub tree: Vec<ReplicaID>,
}

/// The replica filed a complaint.
pub struct AddComplaintEvent {
    pub timestamp: SystemTime,
    pub complaint: Complaint,
}
