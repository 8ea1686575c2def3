/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The aggregation tree: the latency model it is built from, its topology, and robust construction
//! from suspicions.

pub mod latency;

pub mod optitree;

pub mod topology;
