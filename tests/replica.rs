use std::{
    sync::mpsc::{self, Sender},
    time::{Duration, Instant},
};

use kauri_rs::{
    events::{AddComplaintEvent, CollectQCEvent},
    kauri::KauriConfiguration,
    membership::{Membership, RoundRobin},
    ranking::complaint::{Complaint, ComplaintType},
    replica::{Replica, ReplicaSpec},
    types::{
        block::BlockStore,
        certificates::QuorumCertificate,
        crypto_primitives::Keypair,
        data_types::{ReplicaID, ViewNumber},
    },
};
use log::LevelFilter;

mod common;

use crate::common::{
    block_store::MemBlockStore,
    crypto::{crypto_for, keypairs},
    logging::setup_logger,
    membership::{ids, linear_membership},
    network::mock_network,
};

const N: u32 = 7;

/// Start a replica for each of `keypairs` that appears in `running`. Quorum certificates and
/// complaints from every replica are reported on the given channels.
fn start_replicas(
    keypairs: &[Keypair],
    running: &[ReplicaID],
    per_hop_slack: Duration,
    quorum_certificates: Sender<QuorumCertificate>,
    complaints: Sender<Complaint>,
) -> Vec<(Replica, MemBlockStore)> {
    let membership = linear_membership(N);
    let crypto = crypto_for(keypairs);
    let networks = mock_network(ids(1..=N).into_iter());

    keypairs
        .iter()
        .zip(networks)
        .filter(|(keypair, _)| running.contains(&keypair.id()))
        .map(|(keypair, network)| {
            let block_store = MemBlockStore::new();
            let configuration = KauriConfiguration::builder()
                .me(keypair.id())
                .branch_factor(2)
                .per_hop_slack(per_hop_slack)
                .log_events(true)
                .build();
            let quorum_certificates = quorum_certificates.clone();
            let complaints = complaints.clone();

            let replica = ReplicaSpec::builder()
                .network(network)
                .crypto(crypto.clone())
                .block_store(block_store.clone())
                .membership(membership.clone())
                .leaders(RoundRobin::new(membership.replicas()))
                .keypair(keypair.clone())
                .configuration(configuration)
                .on_collect_qc(move |event: &CollectQCEvent| {
                    let _ = quorum_certificates.send(event.quorum_certificate.clone());
                })
                .on_add_complaint(move |event: &AddComplaintEvent| {
                    let _ = complaints.send(event.complaint.clone());
                })
                .build()
                .start();
            (replica, block_store)
        })
        .collect()
}

#[test]
fn replicas_aggregate_a_proposal() {
    setup_logger(LevelFilter::Info);

    let keypairs = keypairs(N);
    let (qc_sender, qc_receiver) = mpsc::channel();
    let (complaint_sender, _complaint_receiver) = mpsc::channel();
    let replicas = start_replicas(
        &keypairs,
        &ids(1..=N),
        Duration::from_secs(5),
        qc_sender,
        complaint_sender,
    );
    for (replica, _) in &replicas {
        replica.connected();
    }

    // Replica 1 leads view 0.
    replicas[0].0.propose(ViewNumber::new(0), b"first block".to_vec());

    let quorum_certificate = qc_receiver.recv_timeout(Duration::from_secs(30)).unwrap();
    assert_eq!(quorum_certificate.view, ViewNumber::new(0));
    assert!(quorum_certificate.participant_count() >= 5);
    assert!(quorum_certificate.is_correct(&crypto_for(&keypairs), &replicas[0].1));

    // Only the root collects a certificate.
    assert!(qc_receiver
        .recv_timeout(Duration::from_millis(200))
        .is_err());
    assert!(replicas[0].1.get(&quorum_certificate.block).is_some());
}

#[test]
fn a_crashed_replica_is_suspected() {
    setup_logger(LevelFilter::Info);

    let keypairs = keypairs(N);
    let crashed = ReplicaID::new(N);
    let (qc_sender, _qc_receiver) = mpsc::channel();
    let (complaint_sender, complaint_receiver) = mpsc::channel();
    let replicas = start_replicas(
        &keypairs,
        &ids(1..N),
        Duration::from_millis(50),
        qc_sender,
        complaint_sender,
    );
    for (replica, _) in &replicas {
        replica.connected();
    }

    replicas[0].0.propose(ViewNumber::new(0), b"first block".to_vec());

    // Whether the crashed replica is a leaf or an internal node, whoever waits for it files a
    // suspicion once the deadline passes.
    let deadline = Instant::now() + Duration::from_secs(30);
    let complaint = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let complaint = complaint_receiver.recv_timeout(remaining).unwrap();
        if complaint.complainant == crashed {
            break complaint;
        }
    };
    assert_eq!(complaint.complaint_type, ComplaintType::Suspicion);

    let reporter = replicas
        .iter()
        .find(|(replica, _)| {
            replica
                .complaints()
                .pending_complaints()
                .iter()
                .any(|pending| pending.complainant == crashed)
        })
        .map(|(replica, _)| replica);
    assert!(reporter.is_some());
}
