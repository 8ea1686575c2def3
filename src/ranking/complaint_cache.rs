/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The suspicion tracker.
//!
//! Complaints go through two stages. [`add_complaint`](ComplaintCache::add_complaint) queues a
//! complaint filed by this replica until the consensus layer decides on it.
//! [`commit_complaints`](ComplaintCache::commit_complaints) then applies decided complaints (from any
//! replica) to the scores and the suspicion graph. Committing is idempotent: a complaint is applied
//! only if its id is greater than every id already applied for the same complainee and complainant.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    tree::optitree::SuspicionGraph,
    types::{
        block::BlockStore, crypto_primitives::Crypto, data_types::ReplicaID,
        participant_set::ParticipantSet,
    },
};

use super::complaint::{Complaint, ComplaintProof, ComplaintType};

/// Score of every participant before any complaint is committed.
pub const INITIAL_SCORE: i64 = 100;

/// A replica is kept out of internal positions once the suspicions it is involved in reach this
/// multiple of the population size.
pub const SUSPICION_FACTOR: f64 = 1.0;

pub struct ComplaintCache {
    me: ReplicaID,
    population: ParticipantSet,
    pending: Vec<Complaint>,
    last_filed: HashMap<ReplicaID, u64>,
    last_applied: HashMap<(ReplicaID, ReplicaID), u64>,
    suspicions: SuspicionGraph,
    scores: BTreeMap<ReplicaID, i64>,
    faulty: ParticipantSet,
}

impl ComplaintCache {
    /// Create a tracker for `me`, with every one of `participants` at [`INITIAL_SCORE`].
    pub fn new(me: ReplicaID, participants: impl IntoIterator<Item = ReplicaID>) -> Self {
        let population: ParticipantSet = participants.into_iter().collect();
        Self {
            me,
            scores: population.iter().map(|id| (*id, INITIAL_SCORE)).collect(),
            suspicions: SuspicionGraph::with_nodes(population.iter().copied()),
            population,
            pending: Vec::new(),
            last_filed: HashMap::new(),
            last_applied: HashMap::new(),
            faulty: ParticipantSet::new(),
        }
    }

    /// Assign `complaint` the next id for its complainant and queue it. Returns the queued complaint.
    pub fn add_complaint(&mut self, mut complaint: Complaint) -> Complaint {
        let last = self.last_filed.entry(complaint.complainant).or_insert(0);
        *last += 1;
        complaint.id = *last;
        log::debug!(
            "Queued {:?} complaint {} by {} against {}",
            complaint.complaint_type,
            complaint.id,
            complaint.complainee,
            complaint.complainant
        );
        self.pending.push(complaint.clone());
        complaint
    }

    /// Complaints filed but not yet committed, in the order they were filed.
    pub fn pending_complaints(&self) -> &[Complaint] {
        &self.pending
    }

    /// Apply decided complaints. Returns how many of them changed state; the rest had already been
    /// applied.
    pub fn commit_complaints(&mut self, complaints: &[Complaint]) -> usize {
        let mut applied = 0;
        for complaint in complaints {
            if complaint.complainee == self.me {
                self.pending.retain(|pending| !pending.same_as(complaint));
            }

            let key = (complaint.complainee, complaint.complainant);
            let last_applied = self.last_applied.entry(key).or_insert(0);
            if complaint.id <= *last_applied {
                log::debug!(
                    "Skipping complaint {} by {} against {}, already applied up to {}",
                    complaint.id,
                    complaint.complainee,
                    complaint.complainant,
                    last_applied
                );
                continue;
            }
            *last_applied = complaint.id;
            applied += 1;

            match complaint.complaint_type {
                ComplaintType::Suspicion => self
                    .suspicions
                    .add_suspicion(complaint.complainee, complaint.complainant),
                complaint_type => {
                    *self
                        .scores
                        .entry(complaint.complainant)
                        .or_insert(INITIAL_SCORE) -= complaint_type.penalty();
                    self.faulty.insert(complaint.complainant);
                }
            }
        }
        applied
    }

    /// Check the evidence of `complaint`. Complaints of type [`ComplaintType::InvalidQuorumCert`] and
    /// [`ComplaintType::InvalidVote`] are valid only if their certificate fails to verify. An
    /// [`ComplaintType::InvalidComplaint`] stands or falls with the complaint it carries. Proposal and
    /// suspicion complaints are accepted without checking any evidence.
    pub fn verify_complaint(
        &self,
        complaint: &Complaint,
        crypto: &impl Crypto,
        block_store: &impl BlockStore,
    ) -> bool {
        match (complaint.complaint_type, &complaint.proof) {
            (ComplaintType::InvalidProposal, _) => true,
            (ComplaintType::Suspicion, _) => true,
            (ComplaintType::InvalidQuorumCert, Some(ComplaintProof::QuorumCert(qc))) => {
                !qc.is_correct(crypto, block_store)
            }
            (ComplaintType::InvalidVote, Some(ComplaintProof::PartialCert(pc))) => {
                !pc.is_correct(crypto, block_store)
            }
            (ComplaintType::InvalidComplaint, Some(ComplaintProof::Complaint(inner))) => {
                self.verify_complaint(inner, crypto, block_store)
            }
            _ => false,
        }
    }

    /// The valid complaints among `complaints`, in order.
    pub fn verify_complaints(
        &self,
        complaints: &[Complaint],
        crypto: &impl Crypto,
        block_store: &impl BlockStore,
    ) -> Vec<Complaint> {
        complaints
            .iter()
            .filter(|complaint| self.verify_complaint(complaint, crypto, block_store))
            .cloned()
            .collect()
    }

    /// The `n` lowest-scoring replicas, lowest first. Equal scores are ordered by identity.
    pub fn get_top_n(&self, n: usize) -> Result<Vec<ReplicaID>, ComplaintError> {
        if n == 0 || n > self.scores.len() {
            return Err(ComplaintError::InvalidCount {
                requested: n,
                population: self.scores.len(),
            });
        }
        let mut ranked: Vec<(i64, ReplicaID)> =
            self.scores.iter().map(|(id, score)| (*score, *id)).collect();
        ranked.sort();
        Ok(ranked.into_iter().take(n).map(|(_, id)| id).collect())
    }

    /// Up to `count` replicas that are trusted to be internal nodes, least suspicious first.
    ///
    /// A replica's suspicion is the number of committed suspicions it is part of, either as the
    /// replica that reported or as the replica that was reported (either could be the faulty one).
    /// Replicas whose suspicion reaches [`SUSPICION_FACTOR`] times the population are excluded. Equal
    /// suspicion is ordered by identity.
    pub fn get_robust_internal_nodes(&self, count: usize) -> Vec<ReplicaID> {
        let involvement = self.suspicion_involvement();
        let population = involvement.len().max(1) as f64;

        let mut trusted: Vec<(u64, ReplicaID)> = involvement
            .into_iter()
            .filter(|(_, total)| (*total as f64) / population < SUSPICION_FACTOR)
            .map(|(id, total)| (total, id))
            .collect();
        trusted.sort();
        trusted.into_iter().take(count).map(|(_, id)| id).collect()
    }

    fn suspicion_involvement(&self) -> BTreeMap<ReplicaID, u64> {
        let mut involvement: BTreeMap<ReplicaID, u64> =
            self.population.iter().map(|id| (*id, 0)).collect();
        for (suspecter, suspect, count) in self.suspicions.suspicions() {
            *involvement.entry(suspecter).or_default() += count as u64;
            *involvement.entry(suspect).or_default() += count as u64;
        }
        involvement
    }

    pub fn get_score(&self, id: &ReplicaID) -> Option<i64> {
        self.scores.get(id).copied()
    }

    pub fn get_suspicion_graph(&self) -> &SuspicionGraph {
        &self.suspicions
    }

    /// How many times each replica has been reported in a committed suspicion.
    pub fn get_suspected_nodes(&self) -> BTreeMap<ReplicaID, u64> {
        let mut suspected = BTreeMap::new();
        for (_, suspect, count) in self.suspicions.suspicions() {
            *suspected.entry(suspect).or_default() += count as u64;
        }
        suspected
    }

    /// Replicas charged by at least one committed, non-suspicion complaint.
    pub fn get_faulty_nodes(&self) -> &ParticipantSet {
        &self.faulty
    }
}

/// Shared, mutex-guarded handle to a [`ComplaintCache`]. The protocol files complaints through it while
/// the consensus layer commits them from another thread.
#[derive(Clone)]
pub struct ComplaintCacheHandle(Arc<Mutex<ComplaintCache>>);

impl ComplaintCacheHandle {
    pub fn new(cache: ComplaintCache) -> Self {
        Self(Arc::new(Mutex::new(cache)))
    }

    /// Lock the cache. A panic in another holder of the lock does not leave the cache in a partial
    /// state, since every method applies its changes one complaint at a time.
    pub fn lock(&self) -> MutexGuard<'_, ComplaintCache> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_complaint(&self, complaint: Complaint) -> Complaint {
        self.lock().add_complaint(complaint)
    }

    pub fn commit_complaints(&self, complaints: &[Complaint]) -> usize {
        self.lock().commit_complaints(complaints)
    }

    pub fn pending_complaints(&self) -> Vec<Complaint> {
        self.lock().pending_complaints().to_vec()
    }
}

/// Enumerates the ways in which a [`ComplaintCache`] query can be invalid.
#[derive(Debug, PartialEq, Eq)]
pub enum ComplaintError {
    /// Asked for zero replicas, or for more replicas than the tracker has scores for.
    InvalidCount { requested: usize, population: usize },
}
