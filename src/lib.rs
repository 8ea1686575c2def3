/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of Kauri, tree-based vote aggregation for BFT consensus, together with the
//! machinery that builds and improves its trees.
//!
//! The crate has three parts:
//! 1. [`kauri`]: the per-view state machine that disseminates a proposal down a tree and aggregates
//!    votes back up to the root.
//! 2. [`tree`] and [`optimizer`]: tree topologies, the latency model, robust tree construction from a
//!    suspicion graph, and offline search for latency-optimal trees.
//! 3. [`ranking`]: complaints about replica behavior, which feed back into tree construction.
//!
//! [`replica`] runs the state machine on its own thread, with pluggable [networking], [crypto
//! and storage](types), and [membership].

pub mod events;

pub mod kauri;

pub mod logging;

pub mod membership;

pub mod networking;

pub mod optimizer;

pub mod ranking;

pub mod replica;

pub mod tree;

pub mod types;

pub(crate) mod event_bus;
