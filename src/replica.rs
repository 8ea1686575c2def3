/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! A running replica is two threads:
//! 1. The protocol thread, which owns the [`Kauri`] state machine. It handles one thing at a time:
//!    commands from the [`Replica`] handle, messages from the network, and deadlines.
//! 2. The event bus thread, which passes [events](crate::events) to the loggers and to user-defined
//!    handlers. It is only started if there is at least one handler.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .network(network)
//!     .crypto(crypto)
//!     .block_store(block_store)
//!     .membership(membership)
//!     .leaders(leaders)
//!     .keypair(keypair)
//!     .configuration(configuration)
//!     .on_collect_qc(collect_qc_handler)
//!     .build()
//!     .start();
//!
//! replica.connected();
//! ```
//!
//! ### Required setters
//!
//! - `.network(...)`
//! - `.crypto(...)`
//! - `.block_store(...)`
//! - `.membership(...)`
//! - `.leaders(...)`
//! - `.keypair(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! - `.complaints(...)`, to share the suspicion tracker with the consensus layer that commits
//!   complaints. By default the replica creates its own.
//! - `.on_start_view(...)`
//! - `.on_disseminate(...)`
//! - `.on_receive_proposal(...)`
//! - `.on_receive_contribution(...)`
//! - `.on_reject_contribution(...)`
//! - `.on_send_contribution(...)`
//! - `.on_collect_qc(...)`
//! - `.on_aggregation_timeout(...)`
//! - `.on_change_tree(...)`
//! - `.on_add_complaint(...)`

use std::{
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::SystemTime,
};

use typed_builder::TypedBuilder;

use crate::{
    event_bus::*,
    events::*,
    kauri::{Kauri, KauriConfiguration},
    membership::{LeaderRotation, Membership},
    networking::{
        messages::{Message, Proposal},
        network::Network,
    },
    ranking::complaint_cache::{ComplaintCache, ComplaintCacheHandle},
    types::{
        block::{Block, BlockStore},
        certificates::PartialCert,
        crypto_primitives::{Crypto, Keypair},
        data_types::ViewNumber,
    },
};

/// Everything needed to start a replica.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building [ReplicaSpec]. See the [module documentation](self) for the
    required and optional setters.
"))]
pub struct ReplicaSpec<
    N: Network + 'static,
    C: Crypto + 'static,
    S: BlockStore + 'static,
    M: Membership + 'static,
    L: LeaderRotation + 'static,
> {
    #[builder(setter(doc = "Set the peer-to-peer network. The argument must implement the [Network] trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the signature scheme. The argument must implement the [Crypto] trait. Required."))]
    crypto: C,
    #[builder(setter(doc = "Set the block store. The argument must implement the [BlockStore] trait. Required."))]
    block_store: S,
    #[builder(setter(doc = "Set the replica set. The argument must implement the [Membership] trait. Required."))]
    membership: M,
    #[builder(setter(doc = "Set the leader of each view. The argument must implement the [LeaderRotation] trait. Required."))]
    leaders: L,
    #[builder(setter(doc = "Set the keypair the replica votes with. Required."))]
    keypair: Keypair,
    #[builder(setter(doc = "Set the [configuration](KauriConfiguration) of the protocol. Required."))]
    configuration: KauriConfiguration,
    #[builder(default, setter(strip_option, doc = "Set the suspicion tracker shared with the consensus layer."))]
    complaints: Option<ComplaintCacheHandle>,

    // Optional event handlers.
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a user-defined handler for [StartViewEvent]."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DisseminateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DisseminateEvent>),
    doc = "Register a user-defined handler for [DisseminateEvent]."))]
    on_disseminate: Option<HandlerPtr<DisseminateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a user-defined handler for [ReceiveProposalEvent]."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveContributionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveContributionEvent>),
    doc = "Register a user-defined handler for [ReceiveContributionEvent]."))]
    on_receive_contribution: Option<HandlerPtr<ReceiveContributionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectContributionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectContributionEvent>),
    doc = "Register a user-defined handler for [RejectContributionEvent]."))]
    on_reject_contribution: Option<HandlerPtr<RejectContributionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendContributionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendContributionEvent>),
    doc = "Register a user-defined handler for [SendContributionEvent]."))]
    on_send_contribution: Option<HandlerPtr<SendContributionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a user-defined handler for [CollectQCEvent]."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AggregationTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AggregationTimeoutEvent>),
    doc = "Register a user-defined handler for [AggregationTimeoutEvent]."))]
    on_aggregation_timeout: Option<HandlerPtr<AggregationTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ChangeTreeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ChangeTreeEvent>),
    doc = "Register a user-defined handler for [ChangeTreeEvent]."))]
    on_change_tree: Option<HandlerPtr<ChangeTreeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AddComplaintEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AddComplaintEvent>),
    doc = "Register a user-defined handler for [AddComplaintEvent]."))]
    on_add_complaint: Option<HandlerPtr<AddComplaintEvent>>,
}

impl<N, C, S, M, L> ReplicaSpec<N, C, S, M, L>
where
    N: Network + 'static,
    C: Crypto + 'static,
    S: BlockStore + 'static,
    M: Membership + 'static,
    L: LeaderRotation + 'static,
{
    /// Starts the protocol thread and, if any event has a handler, the event bus thread. Returns the
    /// handle that keeps them alive.
    pub fn start(self) -> Replica {
        let me = self.configuration.me;
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_start_view,
            self.on_disseminate,
            self.on_receive_proposal,
            self.on_receive_contribution,
            self.on_reject_contribution,
            self.on_send_contribution,
            self.on_collect_qc,
            self.on_aggregation_timeout,
            self.on_change_tree,
            self.on_add_complaint,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            let (publisher, subscriber) = mpsc::channel();
            (Some(publisher), Some(subscriber))
        } else {
            (None, None)
        };

        let complaints = self.complaints.unwrap_or_else(|| {
            ComplaintCacheHandle::new(ComplaintCache::new(me, self.membership.replicas()))
        });
        let kauri = Kauri::new(
            self.configuration,
            self.network,
            self.crypto,
            self.block_store,
            self.membership,
            self.leaders,
            complaints.clone(),
            event_publisher.clone(),
        );

        let (commands, command_receiver) = mpsc::channel();
        let (protocol_shutdown, protocol_shutdown_receiver) = mpsc::channel();
        let protocol = start_protocol(
            kauri,
            self.keypair.clone(),
            command_receiver,
            protocol_shutdown_receiver,
            event_publisher,
        );

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                (
                    Some(start_event_bus(event_handlers, event_subscriber, shutdown_receiver)),
                    Some(shutdown),
                )
            }
            None => (None, None),
        };

        Replica {
            keypair: self.keypair,
            complaints,
            commands,
            protocol: Some(protocol),
            protocol_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// Inputs to the protocol thread from the [`Replica`] handle.
enum Command {
    Connected,
    Begin(PartialCert, Proposal),
    ChangeTree,
}

fn start_protocol<N, C, S, M, L>(
    mut kauri: Kauri<N, C, S, M, L>,
    keypair: Keypair,
    commands: Receiver<Command>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
) -> JoinHandle<()>
where
    N: Network + 'static,
    C: Crypto + 'static,
    S: BlockStore + 'static,
    M: Membership + 'static,
    L: LeaderRotation + 'static,
{
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        let mut idle = true;
        while let Ok(command) = commands.try_recv() {
            idle = false;
            let result = match command {
                Command::Connected => kauri.on_connected(),
                Command::Begin(partial_cert, proposal) => kauri.begin(partial_cert, proposal),
                Command::ChangeTree => {
                    kauri.set_change_tree();
                    Ok(())
                }
            };
            if let Err(err) = result {
                log::warn!("Command failed: {:?}", err);
            }
        }

        if let Some((origin, msg)) = kauri.recv() {
            idle = false;
            let result = match msg {
                Message::Proposal(proposal) => {
                    Event::publish(
                        &event_publisher,
                        Event::ReceiveProposal(ReceiveProposalEvent {
                            timestamp: SystemTime::now(),
                            origin,
                            proposal: proposal.clone(),
                        }),
                    );
                    if proposal.block.is_correct() && proposal.block.view == proposal.view {
                        let partial_cert = PartialCert::sign(&keypair, &proposal.block);
                        kauri.begin(partial_cert, proposal)
                    } else {
                        log::warn!("Ignoring malformed proposal from {}", origin);
                        Ok(())
                    }
                }
                Message::Contribution(contribution) => {
                    kauri.on_receive_contribution(origin, contribution)
                }
            };
            if let Err(err) = result {
                log::warn!("Failed to process a message from {}: {:?}", origin, err);
            }
        }

        if let Err(err) = kauri.tick() {
            log::warn!("Tick failed: {:?}", err);
        }
        if idle {
            thread::yield_now();
        }
    })
}

/// A handle to the background threads of a replica. When this value is dropped, all background
/// threads are gracefully shut down.
pub struct Replica {
    keypair: Keypair,
    complaints: ComplaintCacheHandle,
    commands: Sender<Command>,
    protocol: Option<JoinHandle<()>>,
    protocol_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Signal that the replica is connected to its peers. Views begun before this are replayed.
    pub fn connected(&self) {
        self.send(Command::Connected)
    }

    /// Begin a view with the local vote and the proposal.
    pub fn begin(&self, partial_cert: PartialCert, proposal: Proposal) {
        self.send(Command::Begin(partial_cert, proposal))
    }

    /// Propose a block with `data` in `view`, voting for it with the replica's own keypair. Only the
    /// leader of `view` should call this.
    pub fn propose(&self, view: ViewNumber, data: Vec<u8>) {
        let block = Block::new(view, data);
        let partial_cert = PartialCert::sign(&self.keypair, &block);
        self.begin(partial_cert, Proposal { view, block })
    }

    /// Rebuild the tree at the beginning of the next view.
    pub fn change_tree(&self) {
        self.send(Command::ChangeTree)
    }

    /// The suspicion tracker the replica files complaints with.
    pub fn complaints(&self) -> &ComplaintCacheHandle {
        &self.complaints
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("Protocol thread of replica {} has stopped", self.keypair.id());
        }
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        if let Some(shutdown) = self.event_bus_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.protocol_shutdown.send(());
        if let Some(protocol) = self.protocol.take() {
            let _ = protocol.join();
        }
    }
}
