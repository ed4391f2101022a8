//! Tolerant binning of neighbor distances into shells.
//!
//! Raw distances are noisy floats clustered around a handful of physically
//! distinct radii. The unique radii are found by merging values that are close
//! to their sorted predecessor, and the real line is then cut halfway between
//! neighboring clusters. Every positive distance up to the last boundary lands
//! in exactly one half-open interval `(lower, upper]`.

use serde::{Deserialize, Serialize};

/// Absolute part of the closeness test.
pub const DISTANCE_ATOL: f64 = 1e-8;
/// Relative part of the closeness test.
pub const DISTANCE_RTOL: f64 = 1e-5;

/// `|a - b| <= ATOL + RTOL * |b|`
pub fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= DISTANCE_ATOL + DISTANCE_RTOL * b.abs()
}

/// Sorted unique shell radii. A value close to its sorted predecessor is
/// merged into the predecessor's shell, so each radius is the smallest member
/// of its cluster.
pub fn unique_distances(distances: &[f64]) -> Vec<f64> {
    clusters(distances).into_iter().map(|(min, _)| min).collect()
}

/// `(smallest, largest)` member of every tolerance-merged cluster, ascending.
fn clusters(distances: &[f64]) -> Vec<(f64, f64)> {
    let mut sorted = distances.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();

    let mut clusters: Vec<(f64, f64)> = Vec::new();
    for d in sorted {
        match clusters.last_mut() {
            Some((_, max)) if is_close(d, *max) => *max = d,
            _ => clusters.push((d, d)),
        }
    }
    clusters
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    /// Position of the shell in the table, by increasing radius.
    pub index: usize,
    /// Exclusive lower bound.
    pub lower: f64,
    /// Inclusive upper bound.
    pub upper: f64,
    /// Canonical radius of the shell.
    pub radius: f64,
}

impl Shell {
    pub fn contains(&self, distance: f64) -> bool {
        distance > self.lower && distance <= self.upper
    }
}

/// Ordered partition of `(0, upper]` into neighbor shells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShellTable {
    shells: Vec<Shell>,
}

impl ShellTable {
    pub fn from_distances(distances: &[f64]) -> Self {
        let clusters = clusters(distances);
        let mut shells = Vec::with_capacity(clusters.len());
        let mut lower = 0.0;
        for (index, &(radius, max)) in clusters.iter().enumerate() {
            // Cut halfway between neighboring clusters; the last shell reaches
            // half a step past its radius.
            let upper = match clusters.get(index + 1) {
                Some(&(next, _)) => max + (next - max) / 2.0,
                None => {
                    let previous = if index == 0 { 0.0 } else { clusters[index - 1].0 };
                    max + (radius - previous) / 2.0
                }
            };
            shells.push(Shell {
                index,
                lower,
                upper,
                radius,
            });
            lower = upper;
        }
        Self { shells }
    }

    /// Index of the shell containing `distance`.
    pub fn locate(&self, distance: f64) -> Option<usize> {
        let k = self.shells.partition_point(|s| s.upper < distance);
        self.shells
            .get(k)
            .filter(|s| s.contains(distance))
            .map(|s| s.index)
    }

    pub fn get(&self, index: usize) -> Option<&Shell> {
        self.shells.get(index)
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    pub fn radii(&self) -> Vec<f64> {
        self.shells.iter().map(|s| s.radius).collect()
    }

    pub fn len(&self) -> usize {
        self.shells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }

    /// Upper bound of the last shell, or 0 for an empty table.
    pub fn upper_bound(&self) -> f64 {
        self.shells.last().map_or(0.0, |s| s.upper)
    }
}
