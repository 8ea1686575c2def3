/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that passes [events](crate::events) to their handlers.

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread::{self, JoinHandle},
};

use crate::{events::*, logging::Logger};

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// The handlers of every event type. Each list holds the default logger if logging is enabled,
/// followed by the user's handler if one was registered.
pub(crate) struct EventHandlers {
    pub(crate) start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub(crate) disseminate_handlers: Vec<HandlerPtr<DisseminateEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_contribution_handlers: Vec<HandlerPtr<ReceiveContributionEvent>>,
    pub(crate) reject_contribution_handlers: Vec<HandlerPtr<RejectContributionEvent>>,
    pub(crate) send_contribution_handlers: Vec<HandlerPtr<SendContributionEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
    pub(crate) aggregation_timeout_handlers: Vec<HandlerPtr<AggregationTimeoutEvent>>,
    pub(crate) change_tree_handlers: Vec<HandlerPtr<ChangeTreeEvent>>,
    pub(crate) add_complaint_handlers: Vec<HandlerPtr<AddComplaintEvent>>,
}

fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    handlers.extend(user_handler);
    handlers
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        start_view_handler: Option<HandlerPtr<StartViewEvent>>,
        disseminate_handler: Option<HandlerPtr<DisseminateEvent>>,
        receive_proposal_handler: Option<HandlerPtr<ReceiveProposalEvent>>,
        receive_contribution_handler: Option<HandlerPtr<ReceiveContributionEvent>>,
        reject_contribution_handler: Option<HandlerPtr<RejectContributionEvent>>,
        send_contribution_handler: Option<HandlerPtr<SendContributionEvent>>,
        collect_qc_handler: Option<HandlerPtr<CollectQCEvent>>,
        aggregation_timeout_handler: Option<HandlerPtr<AggregationTimeoutEvent>>,
        change_tree_handler: Option<HandlerPtr<ChangeTreeEvent>>,
        add_complaint_handler: Option<HandlerPtr<AddComplaintEvent>>,
    ) -> Self {
        Self {
            start_view_handlers: handlers(log_events, start_view_handler),
            disseminate_handlers: handlers(log_events, disseminate_handler),
            receive_proposal_handlers: handlers(log_events, receive_proposal_handler),
            receive_contribution_handlers: handlers(log_events, receive_contribution_handler),
            reject_contribution_handlers: handlers(log_events, reject_contribution_handler),
            send_contribution_handlers: handlers(log_events, send_contribution_handler),
            collect_qc_handlers: handlers(log_events, collect_qc_handler),
            aggregation_timeout_handlers: handlers(log_events, aggregation_timeout_handler),
            change_tree_handlers: handlers(log_events, change_tree_handler),
            add_complaint_handlers: handlers(log_events, add_complaint_handler),
        }
    }

    /// Whether no event has a handler, in which case the replica does not start an event bus.
    pub(crate) fn is_empty(&self) -> bool {
        self.start_view_handlers.is_empty()
            && self.disseminate_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_contribution_handlers.is_empty()
            && self.reject_contribution_handlers.is_empty()
            && self.send_contribution_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.aggregation_timeout_handlers.is_empty()
            && self.change_tree_handlers.is_empty()
            && self.add_complaint_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::StartView(start_view_event) => self
                .start_view_handlers
                .iter()
                .for_each(|handler| handler(&start_view_event)),

            Event::Disseminate(disseminate_event) => self
                .disseminate_handlers
                .iter()
                .for_each(|handler| handler(&disseminate_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveContribution(receive_contribution_event) => self
                .receive_contribution_handlers
                .iter()
                .for_each(|handler| handler(&receive_contribution_event)),

            Event::RejectContribution(reject_contribution_event) => self
                .reject_contribution_handlers
                .iter()
                .for_each(|handler| handler(&reject_contribution_event)),

            Event::SendContribution(send_contribution_event) => self
                .send_contribution_handlers
                .iter()
                .for_each(|handler| handler(&send_contribution_event)),

            Event::CollectQC(collect_qc_event) => self
                .collect_qc_handlers
                .iter()
                .for_each(|handler| handler(&collect_qc_event)),

            Event::AggregationTimeout(aggregation_timeout_event) => self
                .aggregation_timeout_handlers
                .iter()
                .for_each(|handler| handler(&aggregation_timeout_event)),

            Event::ChangeTree(change_tree_event) => self
                .change_tree_handlers
                .iter()
                .for_each(|handler| handler(&change_tree_event)),

            Event::AddComplaint(add_complaint_event) => self
                .add_complaint_handlers
                .iter()
                .for_each(|handler| handler(&add_complaint_event)),
        }
    }
}

/// Start the event bus thread, which fires the handlers of every event it receives until it gets a
/// shutdown signal or the publisher goes away.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => {
                log::debug!("Event publisher disconnected, stopping the event bus");
                return;
            }
        }
    })
}
