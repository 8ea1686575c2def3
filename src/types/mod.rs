/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types shared by every component: identities, views, latencies, blocks, certificates, and the
//! pluggable signature primitives.

pub mod block;

pub mod certificates;

pub mod crypto_primitives;

pub mod data_types;

pub mod participant_set;
