/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer networking.
//!
//! Kauri only ever talks to the replicas adjacent to it in the current tree: it sends proposals down
//! to its children and contributions up to its parent. The transport behind [`network::Network`] is
//! provided by the user of the library.

pub mod messages;

pub mod network;
