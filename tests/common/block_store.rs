//! A simple, volatile, in-memory implementation of [`BlockStore`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use kauri_rs::types::{
    block::{Block, BlockStore},
    data_types::CryptoHash,
};

/// An in-memory implementation of [`BlockStore`]. Clones share the same blocks.
#[derive(Clone)]
pub(crate) struct MemBlockStore(Arc<Mutex<HashMap<CryptoHash, Block>>>);

impl MemBlockStore {
    /// Create a new, empty `MemBlockStore`.
    pub(crate) fn new() -> MemBlockStore {
        MemBlockStore(Arc::new(Mutex::new(HashMap::new())))
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl BlockStore for MemBlockStore {
    fn get(&self, hash: &CryptoHash) -> Option<Block> {
        self.0.lock().unwrap().get(hash).cloned()
    }

    fn insert(&mut self, block: Block) {
        self.0.lock().unwrap().insert(block.hash, block);
    }
}
