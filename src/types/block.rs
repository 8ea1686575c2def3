/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type, and the pluggable store that Kauri reads blocks from.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

use super::data_types::{CryptoHash, ViewNumber};

/// A proposed block. Kauri only needs to know the view it was proposed in and its bytes, the
/// rest of the block's structure belongs to the consensus layer.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub view: ViewNumber,
    pub hash: CryptoHash,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(view: ViewNumber, data: Vec<u8>) -> Block {
        Block {
            view,
            hash: Block::hash(view, &data),
            data,
        }
    }

    pub fn hash(view: ViewNumber, data: &[u8]) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(view.to_le_bytes());
        hasher.update(data);
        CryptoHash::new(hasher.finalize().into())
    }

    /// The message that partial certificates for this block sign.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + 32 + self.data.len());
        bytes.extend_from_slice(&self.view.to_le_bytes());
        bytes.extend_from_slice(&self.hash.bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Checks that the stored hash matches the block's contents.
    pub fn is_correct(&self) -> bool {
        self.hash == Block::hash(self.view, &self.data)
    }
}

/// The blocks the consensus layer has stored. Contributions are verified against the bytes of the
/// block returned by `get`.
pub trait BlockStore: Send {
    fn get(&self, hash: &CryptoHash) -> Option<Block>;

    /// Store a block received in a proposal. Storing the same block twice has no effect.
    fn insert(&mut self, block: Block);
}
