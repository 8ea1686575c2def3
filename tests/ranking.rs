use std::thread;

use kauri_rs::{
    ranking::{
        complaint::{Complaint, ComplaintProof, ComplaintType},
        complaint_cache::{ComplaintCache, ComplaintCacheHandle, ComplaintError, INITIAL_SCORE},
        latency_anomaly::LatencyAnomalyDetector,
    },
    types::{
        block::{Block, BlockStore},
        certificates::{PartialCert, QuorumCertificate},
        crypto_primitives::QuorumSignature,
        data_types::{Latency, ReplicaID, ViewNumber},
    },
};

mod common;

use crate::common::{
    block_store::MemBlockStore,
    crypto::{crypto_for, keypairs},
    membership::{ids, linear_membership},
};

fn id(int: u32) -> ReplicaID {
    ReplicaID::new(int)
}

fn cache(me: u32, population: u32) -> ComplaintCache {
    ComplaintCache::new(id(me), ids(1..=population))
}

#[test]
fn suspected_replicas_are_not_robust() {
    let mut cache = cache(1, 7);
    for complainant in [1, 4, 3, 3, 4, 5, 6, 7, 4] {
        let complaint = cache.add_complaint(Complaint::suspicion(id(2), id(complainant)));
        assert_eq!(cache.commit_complaints(&[complaint]), 1);
    }

    assert_eq!(cache.get_robust_internal_nodes(4), ids([1, 5, 6, 7]));
    assert_eq!(cache.get_robust_internal_nodes(10), ids([1, 5, 6, 7, 3, 4]));

    let suspected = cache.get_suspected_nodes();
    assert_eq!(suspected.get(&id(4)), Some(&3));
    assert_eq!(suspected.get(&id(3)), Some(&2));
    assert_eq!(suspected.get(&id(2)), None);
    assert_eq!(cache.get_suspicion_graph().suspects(&id(2), &id(4)), 3);

    // Suspicions never touch the scores.
    assert!(ids(1..=7)
        .iter()
        .all(|replica| cache.get_score(replica) == Some(INITIAL_SCORE)));
    assert!(cache.get_faulty_nodes().is_empty());
}

#[test]
fn committed_complaints_are_charged_to_the_accused() {
    let mut cache = cache(3, 7);
    let complaints: Vec<Complaint> = (1..=2)
        .map(|complaint_id| Complaint {
            id: complaint_id,
            ..Complaint::new(id(1), id(2), ComplaintType::InvalidComplaint, None)
        })
        .collect();

    assert_eq!(cache.commit_complaints(&complaints), 2);
    assert_eq!(cache.get_score(&id(2)), Some(98));
    assert_eq!(cache.get_score(&id(1)), Some(INITIAL_SCORE));

    // Committing the same complaints again changes nothing.
    assert_eq!(cache.commit_complaints(&complaints), 0);
    assert_eq!(cache.get_score(&id(2)), Some(98));

    assert!(cache.get_faulty_nodes().contains(&id(2)));
    assert_eq!(cache.get_score(&id(42)), None);
}

#[test]
fn penalties_by_type() {
    assert_eq!(ComplaintType::InvalidProposal.penalty(), 5);
    assert_eq!(ComplaintType::InvalidQuorumCert.penalty(), 5);
    assert_eq!(ComplaintType::InvalidVote.penalty(), 2);
    assert_eq!(ComplaintType::InvalidComplaint.penalty(), 1);
    assert_eq!(ComplaintType::Suspicion.penalty(), 0);
}

#[test]
fn top_n_lists_the_lowest_scores() {
    let mut cache = cache(1, 5);
    let accuse = |complainant: u32, complaint_type: ComplaintType, complaint_id: u64| Complaint {
        id: complaint_id,
        ..Complaint::new(id(1), id(complainant), complaint_type, None)
    };
    cache.commit_complaints(&[
        accuse(4, ComplaintType::InvalidVote, 1),
        accuse(3, ComplaintType::InvalidProposal, 1),
        accuse(4, ComplaintType::InvalidVote, 2),
        accuse(5, ComplaintType::InvalidVote, 1),
    ]);

    // 3 is at 95, 4 at 96, and 5 at 98.
    assert_eq!(cache.get_top_n(3), Ok(ids([3, 4, 5])));
    assert_eq!(cache.get_top_n(1), Ok(ids([3])));
    assert_eq!(cache.get_top_n(5).unwrap().len(), 5);
    assert_eq!(
        cache.get_top_n(0),
        Err(ComplaintError::InvalidCount {
            requested: 0,
            population: 5
        })
    );
    assert_eq!(
        cache.get_top_n(6),
        Err(ComplaintError::InvalidCount {
            requested: 6,
            population: 5
        })
    );
}

#[test]
fn filed_complaints_wait_for_commit() {
    let mut cache = cache(1, 4);

    let first = cache.add_complaint(Complaint::suspicion(id(1), id(3)));
    let second = cache.add_complaint(Complaint::suspicion(id(1), id(3)));
    let other = cache.add_complaint(Complaint::suspicion(id(1), id(4)));
    assert_eq!((first.id, second.id, other.id), (1, 2, 1));
    assert_eq!(cache.pending_complaints().len(), 3);
    assert!(cache.get_suspected_nodes().is_empty());

    assert_eq!(cache.commit_complaints(&[first, other]), 2);
    assert_eq!(cache.pending_complaints(), &[second.clone()]);
    assert_eq!(cache.get_suspicion_graph().suspects(&id(1), &id(3)), 1);

    // A later id is still applied once an earlier one has been.
    assert_eq!(cache.commit_complaints(&[second]), 1);
    assert!(cache.pending_complaints().is_empty());
    assert_eq!(cache.get_suspicion_graph().suspects(&id(1), &id(3)), 2);
}

#[test]
fn complaints_are_verified_against_their_evidence() {
    let keypairs = keypairs(4);
    let crypto = crypto_for(&keypairs);
    let mut block_store = MemBlockStore::new();
    let block = Block::new(ViewNumber::new(3), vec![1, 2, 3]);
    let other_block = Block::new(ViewNumber::new(3), vec![4, 5, 6]);
    block_store.insert(block.clone());
    let cache = cache(1, 4);

    let valid_vote = PartialCert::sign(&keypairs[1], &block);
    let forged_vote = PartialCert {
        signature: keypairs[1].sign_partial(&other_block.to_bytes()),
        ..valid_vote.clone()
    };
    let vote_complaint = |vote: PartialCert| {
        Complaint::new(
            id(1),
            id(2),
            ComplaintType::InvalidVote,
            Some(ComplaintProof::PartialCert(vote)),
        )
    };

    let unfounded = vote_complaint(valid_vote);
    let founded = vote_complaint(forged_vote);
    assert!(!cache.verify_complaint(&unfounded, &crypto, &block_store));
    assert!(cache.verify_complaint(&founded, &crypto, &block_store));

    let counter_complaint = |complaint: Complaint| {
        Complaint::new(
            id(2),
            id(1),
            ComplaintType::InvalidComplaint,
            Some(ComplaintProof::Complaint(Box::new(complaint))),
        )
    };
    assert!(!cache.verify_complaint(&counter_complaint(unfounded.clone()), &crypto, &block_store));
    assert!(cache.verify_complaint(&counter_complaint(founded.clone()), &crypto, &block_store));
    assert!(cache.verify_complaint(
        &counter_complaint(Complaint::suspicion(id(1), id(3))),
        &crypto,
        &block_store
    ));

    let empty_qc = QuorumCertificate {
        view: block.view,
        block: block.hash,
        signature: QuorumSignature::empty(),
    };
    let qc_complaint = Complaint::new(
        id(1),
        id(3),
        ComplaintType::InvalidQuorumCert,
        Some(ComplaintProof::QuorumCert(empty_qc)),
    );
    assert!(cache.verify_complaint(&qc_complaint, &crypto, &block_store));

    let without_proof = Complaint::new(id(1), id(3), ComplaintType::InvalidVote, None);
    assert!(!cache.verify_complaint(&without_proof, &crypto, &block_store));
    assert!(cache.verify_complaint(&Complaint::suspicion(id(1), id(3)), &crypto, &block_store));

    let verified = cache.verify_complaints(
        &[unfounded, founded.clone(), without_proof, qc_complaint.clone()],
        &crypto,
        &block_store,
    );
    assert_eq!(verified, vec![founded, qc_complaint]);
}

#[test]
fn complaints_survive_the_wire() {
    let keypairs = keypairs(2);
    let block = Block::new(ViewNumber::new(4), vec![7, 8]);
    let vote = PartialCert::sign(&keypairs[1], &block);
    let qc = QuorumCertificate {
        view: block.view,
        block: block.hash,
        signature: keypairs[0].sign_partial(&block.to_bytes()),
    };

    let vote_complaint = Complaint {
        id: 3,
        ..Complaint::new(
            id(1),
            id(2),
            ComplaintType::InvalidVote,
            Some(ComplaintProof::PartialCert(vote)),
        )
    };
    let complaints = [
        Complaint::suspicion(id(1), id(2)),
        Complaint::new(
            id(2),
            id(1),
            ComplaintType::InvalidProposal,
            Some(ComplaintProof::Proposal(block.clone())),
        ),
        Complaint::new(
            id(2),
            id(1),
            ComplaintType::InvalidQuorumCert,
            Some(ComplaintProof::QuorumCert(qc)),
        ),
        vote_complaint.clone(),
        Complaint::new(
            id(2),
            id(1),
            ComplaintType::InvalidComplaint,
            Some(ComplaintProof::Complaint(Box::new(vote_complaint))),
        ),
    ];
    for complaint in complaints {
        let bytes = complaint.to_bytes().unwrap();
        assert_eq!(Complaint::from_bytes(&bytes).unwrap(), complaint);
    }

    let mut unknown_proof = Complaint::suspicion(id(1), id(2)).to_bytes().unwrap();
    *unknown_proof.last_mut().unwrap() = 1;
    unknown_proof.push(9);
    assert!(Complaint::from_bytes(&unknown_proof).is_err());
}

#[test]
fn handles_share_one_tracker() {
    let handle = ComplaintCacheHandle::new(cache(1, 4));
    let filer = handle.clone();

    thread::spawn(move || {
        filer.add_complaint(Complaint::suspicion(id(1), id(2)));
    })
    .join()
    .unwrap();

    let pending = handle.pending_complaints();
    assert_eq!(pending.len(), 1);
    assert_eq!(handle.commit_complaints(&pending), 1);
    assert_eq!(handle.lock().get_suspected_nodes().get(&id(2)), Some(&1));
}

#[test]
fn slow_peers_are_suspected() {
    let membership = linear_membership(4);
    let handle = ComplaintCacheHandle::new(cache(1, 4));
    let detector = LatencyAnomalyDetector::new(id(1), handle.clone());

    assert!(!LatencyAnomalyDetector::is_anomalous(
        Latency::from_micros(100),
        Latency::from_micros(300)
    ));
    assert!(LatencyAnomalyDetector::is_anomalous(
        Latency::from_micros(100),
        Latency::from_micros(301)
    ));

    let filed = detector.report(
        &membership,
        &[
            (id(2), Latency::from_micros(350)),
            (id(3), Latency::from_micros(600)),
            (id(4), Latency::from_micros(1000)),
            (id(1), Latency::from_micros(9999)),
        ],
    );

    assert_eq!(filed.len(), 2);
    assert_eq!(filed[0].complainee, id(1));
    assert_eq!(filed[0].complainant, id(2));
    assert_eq!(filed[1].complainant, id(4));
    assert!(filed
        .iter()
        .all(|complaint| complaint.complaint_type == ComplaintType::Suspicion));
    assert_eq!(handle.pending_complaints(), filed);
}
