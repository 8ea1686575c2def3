/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Aggregatable signatures, and the pluggable [`Crypto`] module that verifies and combines them.
//!
//! Kauri treats signature aggregation as a black box with two operations: `verify` and `combine`.
//! This module defines that interface, plus [`Ed25519Crypto`], a default implementation in which an
//! aggregate is simply the set of the individual Ed25519 signatures of its participants.

use std::collections::{BTreeMap, HashMap};

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, Verifier};
pub use ed25519_dalek::{SigningKey, VerifyingKey};

use super::{
    data_types::{ReplicaID, SignatureBytes},
    participant_set::ParticipantSet,
};

/// An aggregatable signature over a single message, together with the identities that contributed
/// to it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumSignature {
    signatures: BTreeMap<ReplicaID, SignatureBytes>,
}

impl QuorumSignature {
    pub fn empty() -> Self {
        Self {
            signatures: BTreeMap::new(),
        }
    }

    /// A signature carrying the contribution of a single participant.
    pub fn single(signer: ReplicaID, signature: SignatureBytes) -> Self {
        let mut signatures = BTreeMap::new();
        signatures.insert(signer, signature);
        Self { signatures }
    }

    pub fn participants(&self) -> ParticipantSet {
        self.signatures.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaID, &SignatureBytes)> {
        self.signatures.iter()
    }
}

/// Enumerates the ways in which [`Crypto::combine`] can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum CombineError {
    /// The two signatures share at least one participant, so merging them would count a vote twice.
    OverlappingParticipants { shared: ParticipantSet },
}

/// Signature primitives that Kauri consumes.
///
/// Implementations must make `combine` commutative and associative over signatures with disjoint
/// participant sets, and must fail `combine` whenever the participant sets overlap.
pub trait Crypto: Send {
    /// Check that `signature` is a valid aggregate over `message`.
    fn verify(&self, signature: &QuorumSignature, message: &[u8]) -> bool;

    /// Merge two aggregates over the same message into one.
    fn combine(
        &self,
        a: &QuorumSignature,
        b: &QuorumSignature,
    ) -> Result<QuorumSignature, CombineError>;
}

/// [`Crypto`] implementation backed by individual Ed25519 signatures.
#[derive(Clone)]
pub struct Ed25519Crypto {
    keys: HashMap<ReplicaID, VerifyingKey>,
}

impl Ed25519Crypto {
    pub fn new(keys: HashMap<ReplicaID, VerifyingKey>) -> Self {
        Self { keys }
    }

    pub fn verifying_key(&self, replica: &ReplicaID) -> Option<&VerifyingKey> {
        self.keys.get(replica)
    }
}

impl Crypto for Ed25519Crypto {
    fn verify(&self, signature: &QuorumSignature, message: &[u8]) -> bool {
        if signature.is_empty() {
            return false;
        }
        signature.iter().all(|(signer, bytes)| match self.keys.get(signer) {
            Some(verifying_key) => verifying_key
                .verify(message, &Signature::from_bytes(&bytes.bytes()))
                .is_ok(),
            None => false,
        })
    }

    fn combine(
        &self,
        a: &QuorumSignature,
        b: &QuorumSignature,
    ) -> Result<QuorumSignature, CombineError> {
        let shared: ParticipantSet = a
            .signatures
            .keys()
            .filter(|signer| b.signatures.contains_key(signer))
            .copied()
            .collect();
        if !shared.is_empty() {
            return Err(CombineError::OverlappingParticipants { shared });
        }

        let mut signatures = a.signatures.clone();
        signatures.extend(b.signatures.iter().map(|(signer, bytes)| (*signer, *bytes)));
        Ok(QuorumSignature { signatures })
    }
}

/// A participant's identity together with its Ed25519 signing key.
#[derive(Clone)]
pub struct Keypair {
    id: ReplicaID,
    signing_key: SigningKey,
}

impl Keypair {
    pub fn new(id: ReplicaID, signing_key: SigningKey) -> Self {
        Self { id, signing_key }
    }

    pub fn id(&self) -> ReplicaID {
        self.id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign `message`, producing a one-participant aggregate.
    pub fn sign_partial(&self, message: &[u8]) -> QuorumSignature {
        let signature = self.signing_key.sign(message);
        QuorumSignature::single(self.id, SignatureBytes::new(signature.to_bytes()))
    }
}
