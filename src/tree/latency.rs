/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The latency model: one-way latencies between node locations.
//!
//! Locations are dense indices `0..size`. Identities are mapped onto locations by the
//! [membership](crate::membership) layer, so that several identities can share a location.

use std::{
    fmt::{self, Display, Formatter},
    fs, io,
    num::ParseFloatError,
    path::Path,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::types::data_types::Latency;

/// Upper bound (exclusive, in microseconds) of the latencies produced by [`LatencyMatrix::random`].
pub const MAX_RANDOM_LATENCY: u32 = 1000;

/// Square matrix of one-way latencies between locations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatencyMatrix {
    names: Vec<String>,
    latencies: Vec<Vec<Latency>>,
}

impl LatencyMatrix {
    /// Build a matrix from rows of latencies. Fails if the rows do not form a square matrix.
    pub fn new(latencies: Vec<Vec<Latency>>) -> Result<Self, LatencyMatrixError> {
        let size = latencies.len();
        if let Some((row, cells)) = latencies.iter().enumerate().find(|(_, cells)| cells.len() != size) {
            return Err(LatencyMatrixError::NotSquare {
                row,
                expected: size,
                found: cells.len(),
            });
        }
        let names = (0..size).map(|location| location.to_string()).collect();
        Ok(Self { names, latencies })
    }

    /// Convenience constructor for matrices written out by hand, in microseconds.
    pub fn from_micros(rows: Vec<Vec<u32>>) -> Result<Self, LatencyMatrixError> {
        Self::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(Latency::from_micros).collect())
                .collect(),
        )
    }

    /// Matrix of `size` locations with pseudo-random latencies below [`MAX_RANDOM_LATENCY`] and a zero
    /// diagonal. The same `seed` always produces the same matrix. The result is not symmetric; call
    /// [`symmetrized`](Self::symmetrized) for that.
    pub fn random(size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let latencies = (0..size)
            .map(|from| {
                (0..size)
                    .map(|to| {
                        if from == to {
                            Latency::ZERO
                        } else {
                            Latency::from_micros(rng.gen_range(0, MAX_RANDOM_LATENCY))
                        }
                    })
                    .collect()
            })
            .collect();
        let names = (0..size).map(|location| location.to_string()).collect();
        Self { names, latencies }
    }

    /// Read a round-trip latency table from `path`. See [`parse_csv`](Self::parse_csv).
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, LatencyMatrixError> {
        let csv = fs::read_to_string(path)?;
        Self::parse_csv(&csv)
    }

    /// Parse a round-trip latency table.
    ///
    /// Each line is one location: the first column names the region (for a name like
    /// `"Europe (Paris)"` only the city in parentheses is kept) and the remaining columns are
    /// round-trip times in milliseconds to every location. Values are halved to get one-way latencies
    /// and stored in whole microseconds.
    ///
    /// Lines that start with `,` are headers. They keep their index, with an all-zero row, so that
    /// location indices always match line numbers. Parsing stops at the first empty line.
    pub fn parse_csv(csv: &str) -> Result<Self, LatencyMatrixError> {
        let lines: Vec<&str> = csv
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .take_while(|line| !line.is_empty())
            .collect();
        let size = lines.len();
        let mut latencies = vec![vec![Latency::ZERO; size]; size];
        let mut names = vec![String::new(); size];

        for (from, line) in lines.iter().enumerate() {
            if line.starts_with(',') {
                continue;
            }
            let mut columns = line.split(',');
            let region = columns.next().unwrap_or_default();
            names[from] = city_name(region).to_string();

            for (to, column) in columns.enumerate() {
                if column.is_empty() {
                    break;
                }
                if to >= size {
                    return Err(LatencyMatrixError::NotSquare {
                        row: from,
                        expected: size,
                        found: to + 1,
                    });
                }
                let round_trip_millis: f64 = column.trim().parse()?;
                let one_way_micros = (round_trip_millis * 1000.0 / 2.0).round();
                latencies[from][to] = Latency::from_micros(one_way_micros as u32);
            }
        }

        Ok(Self { names, latencies })
    }

    /// Copy of this matrix where both directions of every pair hold the larger of the two recorded
    /// latencies.
    pub fn symmetrized(&self) -> Self {
        let mut latencies = self.latencies.clone();
        for a in 0..self.size() {
            for b in (a + 1)..self.size() {
                let max = self.latencies[a][b].max(self.latencies[b][a]);
                latencies[a][b] = max;
                latencies[b][a] = max;
            }
        }
        Self {
            names: self.names.clone(),
            latencies,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.size()).all(|a| (0..self.size()).all(|b| self.latencies[a][b] == self.latencies[b][a]))
    }

    pub fn size(&self) -> usize {
        self.latencies.len()
    }

    /// Name of a location, e.g., the city it is in.
    pub fn name(&self, location: usize) -> &str {
        &self.names[location]
    }

    /// One-way latency from location `from` to location `to`.
    ///
    /// # Panics
    ///
    /// If either location is outside `0..size`.
    pub fn latency(&self, from: usize, to: usize) -> Latency {
        self.latencies[from][to]
    }

    /// The location in `candidates` with the lowest latency from `from`. Ties go to the candidate
    /// that comes first.
    pub fn nearest(&self, from: usize, candidates: &[usize]) -> Option<usize> {
        let mut nearest: Option<(usize, Latency)> = None;
        for &candidate in candidates {
            let latency = self.latency(from, candidate);
            if nearest.map_or(true, |(_, best)| latency < best) {
                nearest = Some((candidate, latency));
            }
        }
        nearest.map(|(candidate, _)| candidate)
    }

    /// The `k` locations in `candidates` closest to `from`, nearest first. Ties keep the order of
    /// `candidates`.
    pub fn nearest_k(&self, from: usize, candidates: &[usize], k: usize) -> Vec<usize> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by_key(|&candidate| self.latency(from, candidate));
        sorted.truncate(k);
        sorted
    }

    /// Sum of the latencies of every edge of a two-level tree: `root` to each of the first
    /// `branch_factor` entries of `tree`, and each of those to its own block of `branch_factor` leaves.
    pub fn tree_latency(&self, root: usize, branch_factor: usize, tree: &[usize]) -> Latency {
        let mut total = Latency::ZERO;
        for i in 0..branch_factor.min(tree.len()) {
            total += self.latency(root, tree[i]);
            for j in 0..branch_factor {
                let leaf_index = branch_factor * i + j + branch_factor;
                if let Some(&leaf) = tree.get(leaf_index) {
                    total += self.latency(tree[i], leaf);
                }
            }
        }
        total
    }
}

impl Display for LatencyMatrix {
    /// Prints the matrix as a table with aligned columns, in milliseconds.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let width = self
            .names
            .iter()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);
        write!(f, "{:width$}", "", width = width)?;
        for name in &self.names {
            write!(f, "  {:>width$}", name, width = width)?;
        }
        writeln!(f)?;
        for (from, row) in self.latencies.iter().enumerate() {
            write!(f, "{:width$}", self.names[from], width = width)?;
            for latency in row {
                write!(f, "  {:>width$.3}", latency.as_millis_f64(), width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn city_name(region: &str) -> &str {
    match (region.find('('), region.find(')')) {
        (Some(open), Some(close)) if open < close => &region[open + 1..close],
        _ => region,
    }
}

/// Enumerates the ways in which building a [`LatencyMatrix`] can fail.
#[derive(Debug)]
pub enum LatencyMatrixError {
    /// The latency table could not be read.
    Io(io::Error),

    /// A cell of the latency table is not a number.
    MalformedValue(ParseFloatError),

    /// A row does not have one entry per location.
    NotSquare {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl From<io::Error> for LatencyMatrixError {
    fn from(value: io::Error) -> Self {
        LatencyMatrixError::Io(value)
    }
}

impl From<ParseFloatError> for LatencyMatrixError {
    fn from(value: ParseFloatError) -> Self {
        LatencyMatrixError::MalformedValue(value)
    }
}
