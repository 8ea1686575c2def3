use kauri_rs::{
    membership::StaticMembership,
    tree::latency::LatencyMatrix,
    types::data_types::ReplicaID,
};

pub(crate) fn ids(range: impl IntoIterator<Item = u32>) -> Vec<ReplicaID> {
    range.into_iter().map(ReplicaID::new).collect()
}

/// Locations on a line: the latency between locations `a` and `b` is `|a - b| * 100` microseconds.
pub(crate) fn linear_matrix(size: usize) -> LatencyMatrix {
    LatencyMatrix::from_micros(
        (0..size)
            .map(|a| {
                (0..size)
                    .map(|b| (a as i64 - b as i64).unsigned_abs() as u32 * 100)
                    .collect()
            })
            .collect(),
    )
    .unwrap()
}

/// Replicas `1..=n`, replica `i` at location `i - 1` of a [linear matrix](linear_matrix).
pub(crate) fn linear_membership(n: u32) -> StaticMembership {
    StaticMembership::builder()
        .replicas(ids(1..=n))
        .latencies(linear_matrix(n as usize))
        .build()
}
