use std::time::Duration;

use kauri_rs::{
    optimizer::{
        annealing::{
            annealing_performance, compute_base_tree, mutate, parallel_simulated_annealing,
            simulated_annealing, AnnealingParams,
        },
        brute_force::{optimal_tree_channel, optimal_tree_mutex, unique_trees},
        cost::{as_nodes, as_tree, qc_latency, tree_qc_latency},
        num_trees, parse_tree_string, sub_tree_without_root, OptimizationResult, OptimizerError,
    },
    tree::latency::LatencyMatrix,
    types::data_types::Latency,
};
use log::LevelFilter;
use rand::{rngs::StdRng, SeedableRng};

mod common;

use crate::common::{logging::setup_logger, membership::linear_matrix};

fn micros(micros: u32) -> Latency {
    Latency::from_micros(micros)
}

fn params(seed: u64) -> AnnealingParams {
    AnnealingParams::builder()
        .timeout(Duration::from_secs(30))
        .seed(seed)
        .build()
}

#[test]
fn qc_latency_waits_for_enough_subtrees() {
    let matrix = linear_matrix(7);
    let tree: Vec<usize> = (0..7).collect();

    // Internal node 1 delivers its three votes at 800µs, internal node 2 at 1200µs.
    assert_eq!(tree_qc_latency(&matrix, 1, 2, &tree), micros(0));
    assert_eq!(tree_qc_latency(&matrix, 4, 2, &tree), micros(800));
    assert_eq!(tree_qc_latency(&matrix, 5, 2, &tree), micros(1200));
    assert_eq!(tree_qc_latency(&matrix, 7, 2, &tree), micros(1200));
}

#[test]
fn qc_latency_orders_subtrees_by_delivery() {
    let matrix = linear_matrix(7);
    let mut nodes = as_nodes(&[0, 2, 1, 5, 6, 3, 4]);

    assert_eq!(qc_latency(&matrix, 5, 2, &mut nodes), micros(1200));
    assert_eq!(as_tree(&nodes), (0..7).collect::<Vec<_>>());
    assert_eq!(nodes[1].votes, 3);
    assert_eq!(nodes[1].delivered, micros(800));

    // The reordered tree is the same tree.
    assert_eq!(tree_qc_latency(&matrix, 5, 2, &as_tree(&nodes)), micros(1200));
}

#[test]
fn counting_unique_trees() {
    assert_eq!(num_trees(7, 2), 630);
    assert_eq!(num_trees(13, 3), 4_804_800);
    assert_eq!(num_trees(0, 2), 0);

    let mut count = 0;
    unique_trees(&[1, 2, 3, 4, 5, 6], 2, |tree| {
        assert!(tree[0] < tree[1] && tree[2] < tree[3] && tree[4] < tree[5]);
        count += 1;
    });
    assert_eq!(count * 7, num_trees(7, 2));

    let mut count = 0;
    unique_trees(&[1, 2, 3, 4, 5, 6], 3, |_| count += 1);
    assert_eq!(count, 20);
}

#[test]
fn brute_force_finds_the_optimal_tree() {
    setup_logger(LevelFilter::Info);
    let matrix = linear_matrix(7);
    let base_tree: Vec<usize> = (0..7).collect();

    let channel = optimal_tree_channel(&matrix, &base_tree, 2).unwrap();
    let mutex = optimal_tree_mutex(&matrix, &base_tree, 2).unwrap();

    // Rooted in the middle, every subtree reaches the root after 600µs.
    assert_eq!(
        channel,
        OptimizationResult {
            tree: vec![3, 1, 4, 0, 2, 5, 6],
            latency: micros(600),
            analyzed_trees: 630,
        }
    );
    assert_eq!(mutex, channel);
}

#[test]
fn brute_force_strategies_agree_on_random_latencies() {
    let matrix = LatencyMatrix::random(7, 7).symmetrized();
    let base_tree: Vec<usize> = (0..7).collect();

    let channel = optimal_tree_channel(&matrix, &base_tree, 2).unwrap();
    let mutex = optimal_tree_mutex(&matrix, &base_tree, 2).unwrap();

    assert_eq!(mutex, channel);
    assert_eq!(tree_qc_latency(&matrix, 5, 2, &channel.tree), channel.latency);
    assert!(channel.latency <= tree_qc_latency(&matrix, 5, 2, &base_tree));
}

#[test]
fn invalid_trees_are_rejected() {
    let matrix = linear_matrix(7);

    assert_eq!(
        optimal_tree_channel(&matrix, &[0, 1, 9], 2),
        Err(OptimizerError::UnknownLocation {
            location: 9,
            matrix_size: 7
        })
    );
    assert_eq!(
        optimal_tree_mutex(&matrix, &[0, 1, 2], 0),
        Err(OptimizerError::ZeroBranchFactor)
    );
    assert_eq!(
        compute_base_tree(&matrix, 2, 0, 2),
        Err(OptimizerError::TreeTooSmall {
            size: 2,
            branch_factor: 2
        })
    );
    assert_eq!(
        compute_base_tree(&matrix, 7, 7, 2),
        Err(OptimizerError::RootNotInTree { root: 7 })
    );
}

#[test]
fn base_tree_takes_the_nearest_children() {
    let matrix = linear_matrix(7);

    assert_eq!(
        compute_base_tree(&matrix, 7, 3, 2).unwrap(),
        vec![3, 2, 4, 1, 0, 5, 6]
    );
}

#[test]
fn mutate_swaps_within_one_side_of_the_fault_index() {
    let tree: Vec<usize> = (0..7).collect();
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..200 {
        let mutated = mutate(&tree, Some(3), &mut rng);
        let changed: Vec<usize> = (0..7).filter(|i| mutated[*i] != tree[*i]).collect();
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0] < 3, changed[1] < 3);
    }

    for _ in 0..50 {
        let mutated = mutate(&[0, 1, 2], Some(1), &mut rng);
        assert_eq!(mutated, vec![0, 2, 1]);
    }

    assert_eq!(mutate(&[5], None, &mut rng), vec![5]);
}

#[test]
fn annealing_is_reproducible_with_a_seed() {
    let matrix = linear_matrix(7);
    let base_tree = compute_base_tree(&matrix, 7, 0, 2).unwrap();

    let first = simulated_annealing(&matrix, &base_tree, 2, &params(11)).unwrap();
    let second = simulated_annealing(&matrix, &base_tree, 2, &params(11)).unwrap();

    assert_eq!(first, second);
    assert!(first.analyzed_trees > 0);
    assert!(first.latency >= micros(600));
    assert!(first.latency <= tree_qc_latency(&matrix, 5, 2, &base_tree));
}

#[test]
fn parallel_annealing_is_reproducible_with_a_seed() {
    setup_logger(LevelFilter::Info);
    let matrix = LatencyMatrix::random(13, 3).symmetrized();

    let first = parallel_simulated_annealing(&matrix, 13, 3, &params(5)).unwrap();
    let second = parallel_simulated_annealing(&matrix, 13, 3, &params(5)).unwrap();

    assert_eq!(first, second);
    let mut locations = first.tree.clone();
    locations.sort_unstable();
    assert_eq!(locations, (0..13).collect::<Vec<_>>());
    assert_eq!(tree_qc_latency(&matrix, 9, 3, &first.tree), first.latency);
}

#[test]
fn annealing_with_faults_raises_the_quorum() {
    let matrix = linear_matrix(7);
    let base_tree: Vec<usize> = (0..7).collect();
    let params = AnnealingParams::builder()
        .timeout(Duration::from_secs(30))
        .faults(2)
        .fault_index(5)
        .seed(3)
        .build();

    let result = simulated_annealing(&matrix, &base_tree, 2, &params).unwrap();

    assert_eq!(tree_qc_latency(&matrix, 7, 2, &result.tree), result.latency);
}

#[test]
fn annealing_performance_summarizes_runs() {
    let matrix = linear_matrix(7);

    let performance = annealing_performance(&matrix, 7, 2, &params(1), 3).unwrap();

    assert!(performance.mean >= 600.0);
    assert!(performance.std_dev >= 0.0);
}

#[test]
fn tree_strings() {
    assert_eq!(parse_tree_string("[]int{1, 2, 3}"), Ok(vec![1, 2, 3]));
    assert_eq!(parse_tree_string("[4,5]"), Ok(vec![4, 5]));
    assert_eq!(parse_tree_string(" 7, 8 "), Ok(vec![7, 8]));
    assert_eq!(parse_tree_string("{}"), Ok(vec![]));
    assert!(parse_tree_string("1, x").is_err());

    assert_eq!(sub_tree_without_root(2, &[0, 1, 2, 3]), vec![0, 1, 3]);
}

#[test]
fn results_display_tree_and_latency() {
    let result = OptimizationResult {
        tree: vec![0, 1],
        latency: micros(5),
        analyzed_trees: 1,
    };

    assert_eq!(result.to_string(), "tree: [0, 1] has latency: 5µs");
}
