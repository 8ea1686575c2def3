/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Partial certificates (one participant's vote) and quorum certificates (an aggregate of at least a
//! quorum of votes) over a block.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    block::{Block, BlockStore},
    crypto_primitives::{Crypto, Keypair, QuorumSignature},
    data_types::{CryptoHash, ViewNumber},
};

/// A single participant's signature over a block, prior to aggregation.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PartialCert {
    pub view: ViewNumber,
    pub block: CryptoHash,
    pub signature: QuorumSignature,
}

/// An aggregated signature from at least a quorum of participants over the same view and block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCertificate {
    pub view: ViewNumber,
    pub block: CryptoHash,
    pub signature: QuorumSignature,
}

/// Shared by both certificate types: the signature must verify against the bytes of the block the
/// certificate names. A certificate for a block that is not in `block_store` never verifies.
pub(crate) fn verify_over_block(
    crypto: &impl Crypto,
    block_store: &impl BlockStore,
    block: &CryptoHash,
    signature: &QuorumSignature,
) -> bool {
    match block_store.get(block) {
        Some(block) => crypto.verify(signature, &block.to_bytes()),
        None => false,
    }
}

impl PartialCert {
    /// `keypair`'s vote for `block`.
    pub fn sign(keypair: &Keypair, block: &Block) -> PartialCert {
        PartialCert {
            view: block.view,
            block: block.hash,
            signature: keypair.sign_partial(&block.to_bytes()),
        }
    }

    pub fn is_correct(&self, crypto: &impl Crypto, block_store: &impl BlockStore) -> bool {
        self.signature.len() == 1
            && verify_over_block(crypto, block_store, &self.block, &self.signature)
    }
}

impl QuorumCertificate {
    pub fn is_correct(&self, crypto: &impl Crypto, block_store: &impl BlockStore) -> bool {
        verify_over_block(crypto, block_store, &self.block, &self.signature)
    }

    pub fn participant_count(&self) -> usize {
        self.signature.len()
    }
}
