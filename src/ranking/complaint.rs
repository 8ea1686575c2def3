/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Typed accusations against participants.
//!
//! Throughout this module the *complainee* is the replica that files the complaint, and the
//! *complainant* is the replica whose behavior it reports. Scores are therefore always charged to the
//! complainant.

use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    certificates::{PartialCert, QuorumCertificate},
    data_types::ReplicaID,
};

/// Kinds of misbehavior a complaint can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum ComplaintType {
    /// The complainant proposed an invalid block.
    InvalidProposal,

    /// The complainant sent a quorum certificate that does not verify.
    InvalidQuorumCert,

    /// The complainant sent a vote that does not verify.
    InvalidVote,

    /// The complainant filed a complaint that does not hold up.
    InvalidComplaint,

    /// The complainant was slow or silent. Soft: counted, never charged to the score.
    Suspicion,
}

impl ComplaintType {
    /// Score deducted from the complainant when a complaint of this type is committed.
    pub const fn penalty(&self) -> i64 {
        match self {
            ComplaintType::InvalidProposal => 5,
            ComplaintType::InvalidQuorumCert => 5,
            ComplaintType::InvalidVote => 2,
            ComplaintType::InvalidComplaint => 1,
            ComplaintType::Suspicion => 0,
        }
    }
}

/// Evidence attached to a complaint.
///
/// Evidence can itself be a complaint, so the borsh encoding is written by hand: a one-byte variant
/// tag followed by the variant's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComplaintProof {
    Proposal(Block),
    QuorumCert(QuorumCertificate),
    PartialCert(PartialCert),
    Complaint(Box<Complaint>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Complaint {
    /// Sequence number among the complaints against the same complainant. Assigned by
    /// [`ComplaintCache::add_complaint`](super::complaint_cache::ComplaintCache::add_complaint),
    /// starting at 1.
    pub id: u64,
    pub complainee: ReplicaID,
    pub complainant: ReplicaID,
    pub complaint_type: ComplaintType,
    pub proof: Option<ComplaintProof>,
}

const PROPOSAL_TAG: u8 = 0;
const QUORUM_CERT_TAG: u8 = 1;
const PARTIAL_CERT_TAG: u8 = 2;
const COMPLAINT_TAG: u8 = 3;

impl BorshSerialize for ComplaintProof {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            ComplaintProof::Proposal(block) => {
                PROPOSAL_TAG.serialize(writer)?;
                block.serialize(writer)
            }
            ComplaintProof::QuorumCert(qc) => {
                QUORUM_CERT_TAG.serialize(writer)?;
                qc.serialize(writer)
            }
            ComplaintProof::PartialCert(pc) => {
                PARTIAL_CERT_TAG.serialize(writer)?;
                pc.serialize(writer)
            }
            ComplaintProof::Complaint(complaint) => {
                COMPLAINT_TAG.serialize(writer)?;
                complaint.as_ref().serialize(writer)
            }
        }
    }
}

impl BorshDeserialize for ComplaintProof {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        match u8::deserialize_reader(reader)? {
            PROPOSAL_TAG => Ok(ComplaintProof::Proposal(Block::deserialize_reader(reader)?)),
            QUORUM_CERT_TAG => Ok(ComplaintProof::QuorumCert(
                QuorumCertificate::deserialize_reader(reader)?,
            )),
            PARTIAL_CERT_TAG => Ok(ComplaintProof::PartialCert(PartialCert::deserialize_reader(
                reader,
            )?)),
            COMPLAINT_TAG => Ok(ComplaintProof::Complaint(Box::new(
                Complaint::deserialize_reader(reader)?,
            ))),
            tag => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown complaint proof tag {}", tag),
            )),
        }
    }
}

impl BorshSerialize for Complaint {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.id.serialize(writer)?;
        self.complainee.serialize(writer)?;
        self.complainant.serialize(writer)?;
        self.complaint_type.serialize(writer)?;
        match &self.proof {
            Some(proof) => {
                1u8.serialize(writer)?;
                proof.serialize(writer)
            }
            None => 0u8.serialize(writer),
        }
    }
}

impl BorshDeserialize for Complaint {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let id = u64::deserialize_reader(reader)?;
        let complainee = ReplicaID::deserialize_reader(reader)?;
        let complainant = ReplicaID::deserialize_reader(reader)?;
        let complaint_type = ComplaintType::deserialize_reader(reader)?;
        let proof = match u8::deserialize_reader(reader)? {
            0 => None,
            1 => Some(ComplaintProof::deserialize_reader(reader)?),
            flag => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid proof flag {}", flag),
                ))
            }
        };
        Ok(Complaint {
            id,
            complainee,
            complainant,
            complaint_type,
            proof,
        })
    }
}

impl Complaint {
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        self.try_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Complaint> {
        Complaint::try_from_slice(bytes)
    }

    pub fn new(
        complainee: ReplicaID,
        complainant: ReplicaID,
        complaint_type: ComplaintType,
        proof: Option<ComplaintProof>,
    ) -> Self {
        Self {
            id: 0,
            complainee,
            complainant,
            complaint_type,
            proof,
        }
    }

    /// `complainee` reports that `complainant` was slow or did not contribute.
    pub fn suspicion(complainee: ReplicaID, complainant: ReplicaID) -> Self {
        Self::new(complainee, complainant, ComplaintType::Suspicion, None)
    }

    /// Whether `other` is the same complaint, ignoring the proof.
    pub fn same_as(&self, other: &Complaint) -> bool {
        self.id == other.id
            && self.complainee == other.complainee
            && self.complainant == other.complainant
            && self.complaint_type == other.complaint_type
    }
}
