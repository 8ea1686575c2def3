/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [configuration](crate::kauri::KauriConfiguration).
//!
//! Kauri logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
//! onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveContribution](crate::events::ReceiveContributionEvent) is printed:
//!
//! ```text
//! ReceiveContribution, 1701329264, 4, 12, 3
//! ```
//!
//! In the snippet, the third value is the origin of the contribution, the fourth is its view, and the
//! fifth is the number of participants it carries. Block hashes are printed as the first seven
//! characters of their Base64 encoding.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const START_VIEW: &str = "StartView";
pub const DISSEMINATE: &str = "Disseminate";
pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_CONTRIBUTION: &str = "ReceiveContribution";
pub const REJECT_CONTRIBUTION: &str = "RejectContribution";
pub const SEND_CONTRIBUTION: &str = "SendContribution";
pub const COLLECT_QC: &str = "CollectQC";
pub const AGGREGATION_TIMEOUT: &str = "AggregationTimeout";
pub const CHANGE_TREE: &str = "ChangeTree";
pub const ADD_COMPLAINT: &str = "AddComplaint";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for StartViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_view_event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(start_view_event.timestamp),
                start_view_event.view,
                start_view_event.leader,
                ids_to_string(&start_view_event.tree)
            )
        };
        Box::new(logger)
    }
}

impl Logger for DisseminateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |disseminate_event: &DisseminateEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                DISSEMINATE,
                secs_since_unix_epoch(disseminate_event.timestamp),
                disseminate_event.proposal.view,
                first_seven_base64_chars(&disseminate_event.proposal.block.hash.bytes()),
                ids_to_string(&disseminate_event.children)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                receive_proposal_event.origin,
                first_seven_base64_chars(&receive_proposal_event.proposal.block.hash.bytes()),
                receive_proposal_event.proposal.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveContributionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_contribution_event: &ReceiveContributionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_CONTRIBUTION,
                secs_since_unix_epoch(receive_contribution_event.timestamp),
                receive_contribution_event.origin,
                receive_contribution_event.contribution.view,
                receive_contribution_event.contribution.signature.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectContributionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_contribution_event: &RejectContributionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                REJECT_CONTRIBUTION,
                secs_since_unix_epoch(reject_contribution_event.timestamp),
                reject_contribution_event.origin,
                reject_contribution_event.contribution.view,
                reject_contribution_event.contribution.signature.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendContributionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_contribution_event: &SendContributionEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SEND_CONTRIBUTION,
                secs_since_unix_epoch(send_contribution_event.timestamp),
                send_contribution_event.parent,
                send_contribution_event.contribution.view,
                send_contribution_event.contribution.signature.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_qc_event: &CollectQCEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                first_seven_base64_chars(&collect_qc_event.quorum_certificate.block.bytes()),
                collect_qc_event.quorum_certificate.view,
                collect_qc_event.quorum_certificate.participant_count()
            )
        };
        Box::new(logger)
    }
}

impl Logger for AggregationTimeoutEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |aggregation_timeout_event: &AggregationTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                AGGREGATION_TIMEOUT,
                secs_since_unix_epoch(aggregation_timeout_event.timestamp),
                aggregation_timeout_event.view,
                aggregation_timeout_event.timeout.as_millis(),
                ids_to_string(&aggregation_timeout_event.missing)
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChangeTreeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |change_tree_event: &ChangeTreeEvent| {
            log::info!(
                "{}, {}, {}, {}, {:?}, {}",
                CHANGE_TREE,
                secs_since_unix_epoch(change_tree_event.timestamp),
                change_tree_event.view,
                first_seven_base64_chars(&change_tree_event.block.bytes()),
                change_tree_event.strategy,
                ids_to_string(&change_tree_event.tree)
            )
        };
        Box::new(logger)
    }
}

impl Logger for AddComplaintEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |add_complaint_event: &AddComplaintEvent| {
            log::info!(
                "{}, {}, {:?}, {}, {}, {}",
                ADD_COMPLAINT,
                secs_since_unix_epoch(add_complaint_event.timestamp),
                add_complaint_event.complaint.complaint_type,
                add_complaint_event.complaint.complainee,
                add_complaint_event.complaint.complainant,
                add_complaint_event.complaint.id
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

/// Identities separated by spaces, so that they stay a single CSV value.
fn ids_to_string(ids: &[crate::types::data_types::ReplicaID]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
