/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Simulated annealing over tree position assignments.
//!
//! Starting from a latency-greedy [base tree](compute_base_tree), the search repeatedly swaps two
//! positions. A swap that lowers the [QC latency](super::cost::qc_latency) is always kept. A swap
//! that raises it by `Δ` is kept with probability `exp(-Δ / temperature)`. The temperature is
//! multiplied by `1 - cooling_rate` after every step, and the search ends once it falls below
//! `threshold` or `timeout` has passed.

use std::{
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use typed_builder::TypedBuilder;

use crate::{membership::quorum_size, tree::latency::LatencyMatrix};

use super::{
    cost::{as_nodes, as_tree, qc_latency, reset_nodes},
    validate_tree, OptimizationResult, OptimizerError,
};

/// Parameters of a simulated annealing run.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building [AnnealingParams]. Every setter is optional:
    - `.temperature(...)`, defaults to 25000.
    - `.cooling_rate(...)`, defaults to 0.0055.
    - `.threshold(...)`, defaults to 0.5.
    - `.timeout(...)`, defaults to one second.
    - `.faults(...)`, defaults to 0.
    - `.fault_index(...)`, defaults to none.
    - `.seed(...)`, defaults to a seed drawn from the operating system.
"))]
pub struct AnnealingParams {
    #[builder(default = 25000.0, setter(doc = "Set the starting temperature."))]
    pub temperature: f64,

    #[builder(default = 0.0055, setter(doc = "Set the fraction of the temperature lost after every step."))]
    pub cooling_rate: f64,

    #[builder(default = 0.5, setter(doc = "Set the temperature at which the search stops."))]
    pub threshold: f64,

    #[builder(default = Duration::from_secs(1), setter(doc = "Set the maximum duration of a search."))]
    pub timeout: Duration,

    #[builder(default, setter(doc = "Set the number of faulty nodes. The quorum is raised by this many votes."))]
    pub faults: usize,

    #[builder(default, setter(strip_option, doc = "Set the position that splits fault-designated positions from the rest. Swaps never cross it."))]
    pub fault_index: Option<usize>,

    #[builder(default, setter(strip_option, doc = "Set the seed of the random number generator, for reproducible searches."))]
    pub seed: Option<u64>,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        AnnealingParams::builder().build()
    }
}

impl AnnealingParams {
    fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }
}

/// Mean and standard deviation of the latencies found by repeated searches, in microseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnealingPerformance {
    pub mean: f64,
    pub std_dev: f64,
}

/// A starting tree of `tree_size` locations (`0..tree_size`) rooted at `root`: each position, in
/// order, takes as children the `branch_factor` unplaced locations nearest to it.
pub fn compute_base_tree(
    latencies: &LatencyMatrix,
    tree_size: usize,
    root: usize,
    branch_factor: usize,
) -> Result<Vec<usize>, OptimizerError> {
    if root >= tree_size {
        return Err(OptimizerError::RootNotInTree { root });
    }
    let all: Vec<usize> = (0..tree_size).collect();
    validate_tree(&all, branch_factor, latencies.size())?;

    let mut tree = vec![root];
    let mut remaining: Vec<usize> = all.into_iter().filter(|location| *location != root).collect();
    let mut parent = 0;
    while !remaining.is_empty() {
        let nearest = latencies.nearest_k(tree[parent], &remaining, branch_factor);
        remaining.retain(|location| !nearest.contains(location));
        tree.extend(nearest);
        parent += 1;
    }
    Ok(tree)
}

/// Copy of `tree` with two distinct positions swapped.
///
/// With a `fault_index` of `k` (where `0 < k < tree.len()`), both positions are taken from the same
/// side of `k`: either both from `0..k` or both from `k..`. A side with fewer than two positions is
/// never picked. Trees that allow no swap at all are returned unchanged.
pub fn mutate<R: Rng>(tree: &[usize], fault_index: Option<usize>, rng: &mut R) -> Vec<usize> {
    let size = tree.len();
    let mut mutated = tree.to_vec();
    if size < 2 {
        return mutated;
    }

    let (start, end) = match fault_index {
        Some(k) if k > 0 && k < size => match (k >= 2, size - k >= 2) {
            (true, true) => {
                if rng.gen_range(0, size) < k {
                    (0, k)
                } else {
                    (k, size)
                }
            }
            (true, false) => (0, k),
            (false, true) => (k, size),
            (false, false) => return mutated,
        },
        _ => (0, size),
    };

    let first = rng.gen_range(start, end);
    let mut second = rng.gen_range(start, end);
    while second == first {
        second = rng.gen_range(start, end);
    }
    mutated.swap(first, second);
    mutated
}

/// Anneal from `base_tree`. The quorum is the default quorum for the tree's size plus
/// `params.faults`.
pub fn simulated_annealing(
    latencies: &LatencyMatrix,
    base_tree: &[usize],
    branch_factor: usize,
    params: &AnnealingParams,
) -> Result<OptimizationResult, OptimizerError> {
    anneal(latencies, base_tree, branch_factor, params, &mut params.rng(0))
}

fn anneal(
    latencies: &LatencyMatrix,
    base_tree: &[usize],
    branch_factor: usize,
    params: &AnnealingParams,
    rng: &mut StdRng,
) -> Result<OptimizationResult, OptimizerError> {
    validate_tree(base_tree, branch_factor, latencies.size())?;
    let started = Instant::now();
    let quorum = quorum_size(base_tree.len()) + params.faults;

    let mut current = base_tree.to_vec();
    let mut nodes = as_nodes(&current);
    let mut current_latency = qc_latency(latencies, quorum, branch_factor, &mut nodes);
    let mut best = OptimizationResult {
        tree: as_tree(&nodes),
        latency: current_latency,
        analyzed_trees: 0,
    };

    let mut temperature = params.temperature;
    while temperature > params.threshold && started.elapsed() < params.timeout {
        let candidate = mutate(&current, params.fault_index, rng);
        reset_nodes(&mut nodes, candidate[0], &candidate[1..]);
        let latency = qc_latency(latencies, quorum, branch_factor, &mut nodes);

        if latency < best.latency {
            best.latency = latency;
            best.tree = as_tree(&nodes);
        }
        let accept = latency < current_latency || {
            let delta = latency.as_micros() as f64 - current_latency.as_micros() as f64;
            (-delta / temperature).exp() > rng.gen::<f64>()
        };
        if accept {
            current = candidate;
            current_latency = latency;
        }

        temperature *= 1.0 - params.cooling_rate;
        best.analyzed_trees += 1;
    }

    log::debug!(
        "Annealing from root {} finished after {} trees: {}",
        base_tree[0],
        best.analyzed_trees,
        best
    );
    Ok(best)
}

/// Anneal once per root `0..tree_size`, each from its own [base tree](compute_base_tree), in parallel.
/// Returns the best tree overall, with `analyzed_trees` summed over all roots.
pub fn parallel_simulated_annealing(
    latencies: &LatencyMatrix,
    tree_size: usize,
    branch_factor: usize,
    params: &AnnealingParams,
) -> Result<OptimizationResult, OptimizerError> {
    let base_trees = (0..tree_size)
        .map(|root| compute_base_tree(latencies, tree_size, root, branch_factor))
        .collect::<Result<Vec<_>, _>>()?;

    let (results, collector) = mpsc::channel();
    thread::scope(|scope| {
        for (root, base_tree) in base_trees.iter().enumerate() {
            let results = results.clone();
            scope.spawn(move || {
                let mut rng = params.rng(root as u64);
                let _ = results.send(anneal(latencies, base_tree, branch_factor, params, &mut rng));
            });
        }
    });
    drop(results);

    let mut optimal = OptimizationResult::worst();
    let mut analyzed_trees = 0;
    for result in collector {
        let result = result?;
        analyzed_trees += result.analyzed_trees;
        if result.improves_on(&optimal) {
            optimal = result;
        }
    }
    optimal.analyzed_trees = analyzed_trees;
    Ok(optimal)
}

/// Run [`parallel_simulated_annealing`] `iterations` times and summarize the latencies it found.
pub fn annealing_performance(
    latencies: &LatencyMatrix,
    tree_size: usize,
    branch_factor: usize,
    params: &AnnealingParams,
    iterations: usize,
) -> Result<AnnealingPerformance, OptimizerError> {
    let mut samples = Vec::with_capacity(iterations);
    for iteration in 0..iterations {
        let params = AnnealingParams {
            seed: params.seed.map(|seed| seed.wrapping_add((iteration * tree_size) as u64)),
            ..params.clone()
        };
        let result = parallel_simulated_annealing(latencies, tree_size, branch_factor, &params)?;
        samples.push(result.latency.as_micros() as f64);
    }
    Ok(mean_std_dev(&samples))
}

/// Mean and sample standard deviation.
fn mean_std_dev(samples: &[f64]) -> AnnealingPerformance {
    if samples.is_empty() {
        return AnnealingPerformance {
            mean: 0.0,
            std_dev: 0.0,
        };
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let std_dev = if samples.len() > 1 {
        let variance = samples.iter().map(|sample| (sample - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    } else {
        0.0
    };
    AnnealingPerformance { mean, std_dev }
}
