/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tree-based dissemination of proposals and aggregation of votes.
//!
//! In Kauri, the leader of a view does not exchange messages with every replica. The replicas are
//! arranged in a tree rooted at the leader:
//! 1. **Dissemination**: the proposal travels from the root down to the leaves. Every replica that
//!    receives it votes.
//! 2. **Aggregation**: votes travel back up. Each internal replica merges the votes of its subtree
//!    with its own, and forwards the aggregate to its parent once the whole subtree has contributed
//!    or its deadline passes.
//!
//! As soon as any aggregate reaches the quorum size, a quorum certificate is collected.
//!
//! ## Trees
//!
//! All replicas derive the same tree for a view from shared inputs: the shared random seed, the
//! proposed block, the committed complaints, and the [strategy](TreeStrategy). View 0 uses a random
//! tree. View 1, and the first view after each tree change, use the configured strategy. In every
//! view, the leader is then swapped into the root.
//!
//! Children that do not contribute before their parent forwards are reported with a
//! [suspicion](crate::ranking::complaint::ComplaintType::Suspicion). Under the
//! [robust](TreeStrategy::Robust) strategy, the next tree keeps suspicious replicas out of internal
//! positions.

pub mod implementation;

pub mod types;

pub use implementation::{Kauri, KauriConfiguration, KauriError};
pub use types::{TreeStrategy, ViewState};
