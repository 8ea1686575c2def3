/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Turns latency measurements into suspicion complaints.

use crate::{
    membership::Membership,
    types::data_types::{Latency, ReplicaID},
};

use super::{
    complaint::Complaint,
    complaint_cache::ComplaintCacheHandle,
};

/// A measured latency above this multiple of the expected latency is an anomaly.
pub const LATENCY_ANOMALY_FACTOR: u32 = 3;

/// Compares measured latencies to peers against the latencies the membership expects, and files a
/// [suspicion](Complaint::suspicion) against every peer that is too slow.
pub struct LatencyAnomalyDetector {
    me: ReplicaID,
    complaints: ComplaintCacheHandle,
}

impl LatencyAnomalyDetector {
    pub fn new(me: ReplicaID, complaints: ComplaintCacheHandle) -> Self {
        Self { me, complaints }
    }

    /// Whether `measured` is anomalous given `expected`.
    pub fn is_anomalous(expected: Latency, measured: Latency) -> bool {
        measured.as_micros() as u64 > expected.as_micros() as u64 * LATENCY_ANOMALY_FACTOR as u64
    }

    /// File a suspicion for each peer in `measured` whose latency is anomalous. Returns the queued
    /// complaints.
    pub fn report<M: Membership>(
        &self,
        membership: &M,
        measured: &[(ReplicaID, Latency)],
    ) -> Vec<Complaint> {
        measured
            .iter()
            .filter(|(peer, _)| *peer != self.me)
            .filter(|(peer, latency)| {
                Self::is_anomalous(membership.latency(&self.me, peer), *latency)
            })
            .map(|(peer, latency)| {
                log::info!(
                    "Latency to {} is {}, expected at most {}x {}",
                    peer,
                    latency,
                    LATENCY_ANOMALY_FACTOR,
                    membership.latency(&self.me, peer)
                );
                self.complaints
                    .add_complaint(Complaint::suspicion(self.me, *peer))
            })
            .collect()
    }
}
