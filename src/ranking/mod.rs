/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Complaints about replica behavior, and the tracker that turns them into scores and suspicions.
//!
//! The [Kauri](crate::kauri) protocol files a [suspicion](complaint::ComplaintType::Suspicion) for
//! every child that fails to contribute in time. Committed suspicions build up the
//! [suspicion graph](crate::tree::optitree::SuspicionGraph) that the robust tree strategy uses to keep
//! suspicious replicas out of internal positions. Other complaint types lower the complainant's score
//! and mark it faulty, which moves it to a leaf on the next tree change.

pub mod complaint;

pub mod complaint_cache;

pub mod latency_anomaly;
