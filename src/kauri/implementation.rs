/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the Kauri dissemination and aggregation protocol.
//!
//! Main type: [`Kauri`].

use std::{
    mem,
    sync::mpsc::Sender,
    time::{Duration, Instant, SystemTime},
};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use typed_builder::TypedBuilder;

use crate::{
    events::{
        AddComplaintEvent, AggregationTimeoutEvent, ChangeTreeEvent, CollectQCEvent,
        DisseminateEvent, Event, ReceiveContributionEvent, RejectContributionEvent,
        SendContributionEvent, StartViewEvent,
    },
    membership::{LeaderRotation, Membership},
    networking::{
        messages::{Contribution, Message, Proposal},
        network::Network,
    },
    ranking::{complaint::Complaint, complaint_cache::ComplaintCacheHandle},
    tree::{
        optitree::{assign_leaves, OptiTree},
        topology::{TopologyError, TreeTopology},
    },
    types::{
        block::BlockStore,
        certificates::{PartialCert, QuorumCertificate},
        crypto_primitives::Crypto,
        data_types::{CryptoHash, ReplicaID, ViewNumber},
    },
};

use super::types::{TreeStrategy, ViewState};

/// Parameters of a [`Kauri`] participant.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building [KauriConfiguration]. On the builder call the following methods to
    construct a valid [KauriConfiguration].

    Required:
    - `.me(...)`
    - `.branch_factor(...)`

    Optional:
    - `.per_hop_slack(...)`, defaults to 30 milliseconds.
    - `.tree_strategy(...)`, defaults to [TreeStrategy::Random].
    - `.faulty(...)`, defaults to false.
    - `.tree_change_interval(...)`, defaults to no periodic tree changes.
    - `.log_events(...)`, defaults to false.
"))]
pub struct KauriConfiguration {
    #[builder(setter(doc = "Set the identity of the local replica. Required."))]
    pub me: ReplicaID,

    #[builder(setter(doc = "Set the maximum number of children of an internal node. Required."))]
    pub branch_factor: usize,

    #[builder(default = Duration::from_millis(30), setter(doc = "Set the time allowed for each level of the tree before aggregation is cut short."))]
    pub per_hop_slack: Duration,

    #[builder(default = TreeStrategy::Random, setter(doc = "Set how trees are built from view 1 on."))]
    pub tree_strategy: TreeStrategy,

    #[builder(default, setter(doc = "Make the replica stay silent once its identity is within the active fault count. For testing only."))]
    pub faulty: bool,

    #[builder(default, setter(strip_option, doc = "Set the interval at which the tree is changed and the active fault count grows."))]
    pub tree_change_interval: Option<Duration>,

    #[builder(default, setter(doc = "Enable the default event loggers."))]
    pub log_events: bool,
}

/// A single participant in the Kauri protocol.
///
/// # Usage
///
/// `Kauri` is event-oriented. It must be driven by a single thread that calls, in any order:
/// 1. [`on_connected`](Self::on_connected): once the replica is connected to its peers. Views begun
///    before this are deferred and replayed here.
/// 2. [`begin`](Self::begin): when the consensus layer starts a view, with the local vote and the
///    proposal.
/// 3. [`on_receive_contribution`](Self::on_receive_contribution): when a child forwards its aggregate.
/// 4. [`tick`](Self::tick): regularly, to fire the aggregation deadline and the tree-change ticker.
/// 5. [`set_change_tree`](Self::set_change_tree): to rebuild the tree at the next view.
///
/// A view goes through dissemination (the proposal is sent to the children), aggregation (children's
/// contributions are verified and merged), and ends once the aggregate is forwarded to the parent. A
/// replica forwards as soon as its whole subtree has contributed, or when the deadline of
/// `height × per_hop_slack` passes, whichever comes first.
pub struct Kauri<N: Network, C: Crypto, S: BlockStore, M: Membership, L: LeaderRotation> {
    config: KauriConfiguration,
    network: N,
    crypto: C,
    block_store: S,
    membership: M,
    leaders: L,
    complaints: ComplaintCacheHandle,
    event_publisher: Option<Sender<Event>>,
    topology: Option<TreeTopology>,
    deferred: Vec<(PartialCert, Proposal)>,
    view_state: Option<ViewState>,
    change_tree: bool,
    partition_cursor: usize,
    active_fault_threshold: u32,
    next_tree_change: Option<Instant>,
}

impl<N: Network, C: Crypto, S: BlockStore, M: Membership, L: LeaderRotation> Kauri<N, C, S, M, L> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: KauriConfiguration,
        network: N,
        crypto: C,
        block_store: S,
        membership: M,
        leaders: L,
        complaints: ComplaintCacheHandle,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            network,
            crypto,
            block_store,
            membership,
            leaders,
            complaints,
            event_publisher,
            topology: None,
            deferred: Vec::new(),
            view_state: None,
            change_tree: false,
            partition_cursor: 0,
            active_fault_threshold: 0,
            next_tree_change: None,
        }
    }

    pub fn config(&self) -> &KauriConfiguration {
        &self.config
    }

    /// The current tree, once connected.
    pub fn topology(&self) -> Option<&TreeTopology> {
        self.topology.as_ref()
    }

    /// The state of the current view, once a view has begun.
    pub fn view_state(&self) -> Option<&ViewState> {
        self.view_state.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.topology.is_some()
    }

    /// Number of views waiting for [`on_connected`](Self::on_connected).
    pub fn deferred_views(&self) -> usize {
        self.deferred.len()
    }

    /// Faulty replicas with an identity up to this value stay silent.
    pub fn active_fault_threshold(&self) -> u32 {
        self.active_fault_threshold
    }

    pub fn complaints(&self) -> &ComplaintCacheHandle {
        &self.complaints
    }

    /// Install the initial tree (all replicas in ascending order), start the tree-change ticker, and
    /// replay the views begun so far. A deferred view that fails to begin is logged and skipped. Does
    /// nothing if already connected.
    pub fn on_connected(&mut self) -> Result<(), KauriError> {
        if self.topology.is_some() {
            return Ok(());
        }
        self.topology = Some(TreeTopology::new(
            self.config.branch_factor,
            self.membership.replicas(),
        )?);
        if let Some(interval) = self.config.tree_change_interval {
            self.next_tree_change = Some(Instant::now() + interval);
        }

        for (partial_cert, proposal) in mem::take(&mut self.deferred) {
            let view = proposal.view;
            log::debug!("Replaying deferred view {}", view);
            if let Err(err) = self.begin(partial_cert, proposal) {
                log::warn!("Deferred view {} could not begin: {:?}", view, err);
            }
        }
        Ok(())
    }

    /// Receive one message from the network, if one is available.
    pub(crate) fn recv(&mut self) -> Option<(ReplicaID, Message)> {
        self.network.recv()
    }

    /// Rebuild the tree at the beginning of the next view.
    pub fn set_change_tree(&mut self) {
        self.change_tree = true;
    }

    /// Start aggregating votes for `proposal`, with `partial_cert` as the local replica's vote.
    ///
    /// Picks the tree for the view, moves the view's leader to the root, and sends the proposal to the
    /// local replica's children. A leaf has no one to wait for, so it forwards its vote to its parent
    /// immediately.
    pub fn begin(&mut self, partial_cert: PartialCert, proposal: Proposal) -> Result<(), KauriError> {
        if self.topology.is_none() {
            log::debug!("Not connected yet, deferring view {}", proposal.view);
            self.deferred.push((partial_cert, proposal));
            return Ok(());
        }
        if partial_cert.view != proposal.view || partial_cert.block != proposal.block.hash {
            return Err(KauriError::PartialCertMismatch {
                view: proposal.view,
            });
        }

        let view = proposal.view;
        let block = proposal.block.hash;
        self.block_store.insert(proposal.block.clone());
        self.view_state = Some(ViewState::new(view, block, partial_cert.signature));

        self.select_tree(view, &block)?;
        let leader = self.leaders.leader(view);
        let topology = self.topology.as_mut().ok_or(KauriError::NotConnected)?;
        topology.place_leader(&leader)?;
        Event::publish(
            &self.event_publisher,
            Event::StartView(StartViewEvent {
                timestamp: SystemTime::now(),
                view,
                leader,
                tree: topology.identities().to_vec(),
            }),
        );

        if self.config.faulty && self.config.me.int() <= self.active_fault_threshold {
            log::info!(
                "Replica {} is simulating a fault in view {}",
                self.config.me,
                view
            );
            return Ok(());
        }

        self.check_quorum();
        self.disseminate(proposal)
    }

    /// Verify and merge a contribution from `origin`. Contributions for another view are ignored, and
    /// contributions that fail verification or overlap with the aggregate are dropped.
    pub fn on_receive_contribution(
        &mut self,
        origin: ReplicaID,
        contribution: Contribution,
    ) -> Result<(), KauriError> {
        let Some(state) = self.view_state.as_mut() else {
            return Ok(());
        };
        if contribution.view != state.view {
            log::debug!(
                "Ignoring contribution from {} for view {} in view {}",
                origin,
                contribution.view,
                state.view
            );
            return Ok(());
        }

        let verified = match self.block_store.get(&state.block) {
            Some(block) => self.crypto.verify(&contribution.signature, &block.to_bytes()),
            None => false,
        };
        let merged = if verified {
            match self.crypto.combine(&state.aggregate, &contribution.signature) {
                Ok(aggregate) => Some(aggregate),
                Err(err) => {
                    log::warn!("Cannot merge contribution from {}: {:?}", origin, err);
                    None
                }
            }
        } else {
            log::warn!(
                "Contribution from {} for view {} does not verify",
                origin,
                contribution.view
            );
            None
        };
        let Some(aggregate) = merged else {
            Event::publish(
                &self.event_publisher,
                Event::RejectContribution(RejectContributionEvent {
                    timestamp: SystemTime::now(),
                    origin,
                    contribution,
                }),
            );
            return Ok(());
        };

        state.aggregate = aggregate;
        state.senders.insert(origin);
        Event::publish(
            &self.event_publisher,
            Event::ReceiveContribution(ReceiveContributionEvent {
                timestamp: SystemTime::now(),
                origin,
                contribution,
            }),
        );

        self.check_quorum();
        self.forward_if_complete()
    }

    /// Fire the aggregation deadline of the current view and the tree-change ticker, if they are due.
    pub fn tick(&mut self) -> Result<(), KauriError> {
        let now = Instant::now();

        let expired = self.view_state.as_ref().is_some_and(|state| {
            !state.aggregation_sent && state.deadline.is_some_and(|deadline| now >= deadline)
        });
        if expired {
            if let (Some(state), Some(topology)) = (&self.view_state, &self.topology) {
                let missing = state.missing(&topology.subtree_identities(&self.config.me));
                log::info!(
                    "Aggregation deadline of view {} passed, missing {:?}",
                    state.view,
                    missing
                );
                Event::publish(
                    &self.event_publisher,
                    Event::AggregationTimeout(AggregationTimeoutEvent {
                        timestamp: SystemTime::now(),
                        view: state.view,
                        timeout: self.aggregation_timeout(topology),
                        missing,
                    }),
                );
            }
            self.send_contribution_to_parent()?;
        }

        if let (Some(next), Some(interval)) =
            (self.next_tree_change, self.config.tree_change_interval)
        {
            if now >= next {
                self.active_fault_threshold += 1;
                self.change_tree = true;
                self.next_tree_change = Some(now + interval);
                log::info!(
                    "Tree change due, active fault count is now {}",
                    self.active_fault_threshold
                );
            }
        }
        Ok(())
    }

    /// Forward the aggregate to the parent, at most once per view. Files a suspicion against every
    /// child that has not contributed. The root has no parent, so for it this only ends aggregation.
    pub fn send_contribution_to_parent(&mut self) -> Result<(), KauriError> {
        let me = self.config.me;
        let topology = self.topology.as_ref().ok_or(KauriError::NotConnected)?;
        let Some(state) = self.view_state.as_mut() else {
            return Ok(());
        };
        if state.aggregation_sent {
            return Ok(());
        }
        state.aggregation_sent = true;
        state.deadline = None;

        for child in topology.children(&me) {
            if state.senders.contains(&child) {
                continue;
            }
            let complaint = self.complaints.add_complaint(Complaint::suspicion(me, child));
            Event::publish(
                &self.event_publisher,
                Event::AddComplaint(AddComplaintEvent {
                    timestamp: SystemTime::now(),
                    complaint,
                }),
            );
        }

        let Some(parent) = topology.parent(&me) else {
            log::debug!(
                "Aggregation of view {} ended at the root with {} participants",
                state.view,
                state.aggregate.len()
            );
            return Ok(());
        };
        let contribution = Contribution {
            id: me,
            signature: state.aggregate.clone(),
            view: state.view,
        };
        match self.network.send_contribution(parent, contribution.clone()) {
            Ok(()) => Event::publish(
                &self.event_publisher,
                Event::SendContribution(SendContributionEvent {
                    timestamp: SystemTime::now(),
                    parent,
                    contribution,
                }),
            ),
            Err(err) => log::warn!(
                "Failed to send contribution for view {} to {}: {:?}",
                state.view,
                parent,
                err
            ),
        }
        Ok(())
    }

    fn disseminate(&mut self, proposal: Proposal) -> Result<(), KauriError> {
        let me = self.config.me;
        let topology = self.topology.as_ref().ok_or(KauriError::NotConnected)?;
        let children = topology.children(&me);
        if children.is_empty() {
            return self.send_contribution_to_parent();
        }

        let deadline = Instant::now() + self.aggregation_timeout(topology);
        match self.network.send_proposal(&children, proposal.clone()) {
            Ok(()) => Event::publish(
                &self.event_publisher,
                Event::Disseminate(DisseminateEvent {
                    timestamp: SystemTime::now(),
                    proposal,
                    children,
                }),
            ),
            Err(err) => log::warn!(
                "Failed to send the proposal for view {} to {:?}: {:?}",
                proposal.view,
                children,
                err
            ),
        }
        if let Some(state) = self.view_state.as_mut() {
            state.deadline = Some(deadline);
        }
        self.forward_if_complete()
    }

    fn aggregation_timeout(&self, topology: &TreeTopology) -> Duration {
        self.config.per_hop_slack * topology.height() as u32
    }

    fn check_quorum(&mut self) {
        let Some(state) = self.view_state.as_mut() else {
            return;
        };
        if state.quorum_certificate.is_some()
            || state.aggregate.len() < self.membership.quorum_size(state.view)
        {
            return;
        }
        let quorum_certificate = QuorumCertificate {
            view: state.view,
            block: state.block,
            signature: state.aggregate.clone(),
        };
        state.quorum_certificate = Some(quorum_certificate.clone());
        Event::publish(
            &self.event_publisher,
            Event::CollectQC(CollectQCEvent {
                timestamp: SystemTime::now(),
                quorum_certificate,
            }),
        );
    }

    fn forward_if_complete(&mut self) -> Result<(), KauriError> {
        let (Some(state), Some(topology)) = (&self.view_state, &self.topology) else {
            return Ok(());
        };
        if state.aggregation_sent {
            return Ok(());
        }
        let me = self.config.me;
        let participants = state.aggregate.participants();
        let complete = participants.contains(&me)
            && participants.is_superset(topology.subtree_identities(&me).iter());
        if complete {
            self.send_contribution_to_parent()
        } else {
            Ok(())
        }
    }

    /// Install the tree for `view`: a random tree in view 0, a tree from the configured strategy in
    /// view 1 and after a tree change, and the current tree otherwise. Known-faulty replicas are moved
    /// to the leaves of every new tree.
    fn select_tree(&mut self, view: ViewNumber, block: &CryptoHash) -> Result<(), KauriError> {
        let (positions, strategy) = if view == ViewNumber::init() {
            (self.random_positions(block), TreeStrategy::Random)
        } else if view.int() == 1 || self.change_tree {
            (self.strategy_positions(view)?, self.config.tree_strategy)
        } else {
            return Ok(());
        };

        let mut topology = TreeTopology::new(self.config.branch_factor, positions)?;
        let faulty = self.complaints.lock().get_faulty_nodes().clone();
        topology.move_to_leaves(&faulty);
        self.change_tree = false;

        Event::publish(
            &self.event_publisher,
            Event::ChangeTree(ChangeTreeEvent {
                timestamp: SystemTime::now(),
                view,
                block: *block,
                strategy,
                tree: topology.identities().to_vec(),
            }),
        );
        self.topology = Some(topology);
        Ok(())
    }

    /// All replicas, shuffled with the shared seed mixed with the block hash.
    fn random_positions(&self, block: &CryptoHash) -> Vec<ReplicaID> {
        let mut replicas = self.membership.replicas();
        let seed = self.membership.shared_random_seed() ^ block.prefix_u64();
        replicas.shuffle(&mut StdRng::seed_from_u64(seed));
        replicas
    }

    fn strategy_positions(&mut self, view: ViewNumber) -> Result<Vec<ReplicaID>, KauriError> {
        let branch_factor = self.config.branch_factor;
        let positions = match self.config.tree_strategy {
            TreeStrategy::Random => {
                let replicas = self.membership.replicas();
                let mut shuffled = replicas.clone();
                shuffled.shuffle(&mut StdRng::seed_from_u64(
                    self.membership.shared_random_seed(),
                ));
                let partitions: Vec<&[ReplicaID]> = shuffled.chunks(branch_factor + 1).collect();
                if partitions.is_empty() {
                    return Err(TopologyError::Empty.into());
                }
                let mut positions = partitions[self.partition_cursor % partitions.len()].to_vec();
                self.partition_cursor += 1;
                let rest: Vec<ReplicaID> = replicas
                    .into_iter()
                    .filter(|replica| !positions.contains(replica))
                    .collect();
                positions.extend(rest);
                positions
            }
            TreeStrategy::Committees => {
                let committees = self.membership.committees_of_size(branch_factor + 1);
                let internal = if committees.is_empty() {
                    log::debug!("Too few replicas for a committee, using the whole replica set");
                    self.membership.replicas()
                } else {
                    let committee = committees[self.partition_cursor % committees.len()].clone();
                    self.partition_cursor += 1;
                    committee
                };
                assign_leaves(&self.membership, branch_factor, internal)
            }
            TreeStrategy::Robust => {
                let suspicions = self.complaints.lock().get_suspicion_graph().clone();
                let leader = self.leaders.leader(view);
                OptiTree::new(leader, branch_factor, &self.membership)
                    .tree(&suspicions)?
                    .identities()
                    .to_vec()
            }
        };
        Ok(positions)
    }
}

/// Enumerates the ways in which a call into [`Kauri`] can fail. Lost contributions and failed sends
/// are not errors: they are logged and the view carries on.
#[derive(Debug)]
pub enum KauriError {
    /// The tree could not be built from the replica set.
    TopologyError(TopologyError),

    /// An operation that needs a tree was called before [`Kauri::on_connected`].
    NotConnected,

    /// The local vote passed to [`Kauri::begin`] is not for the proposed block.
    PartialCertMismatch { view: ViewNumber },
}

impl From<TopologyError> for KauriError {
    fn from(value: TopologyError) -> Self {
        KauriError::TopologyError(value)
    }
}
