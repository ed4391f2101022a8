use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named assignment of spins to sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagneticPattern {
    pub name: String,
    pub spins: BTreeMap<usize, f64>,
}

impl MagneticPattern {
    pub fn new(name: impl Into<String>, spins: impl IntoIterator<Item = (usize, f64)>) -> Self {
        Self {
            name: name.into(),
            spins: spins.into_iter().collect(),
        }
    }

    /// Pattern whose site indices are the positions in `spins`.
    pub fn from_spins(name: impl Into<String>, spins: &[f64]) -> Self {
        Self::new(name, spins.iter().copied().enumerate())
    }

    pub fn spin(&self, site: usize) -> Option<f64> {
        self.spins.get(&site).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSign {
    pub pattern: String,
    pub i: usize,
    pub j: usize,
    pub sign: f64,
}

/// Sign of every pairwise interaction of `pattern`: each unordered site pair
/// once, self pairs included, with `sign = spin_i * spin_j`.
pub fn interaction_signs(pattern: &MagneticPattern) -> Vec<InteractionSign> {
    let sites: Vec<(usize, f64)> = pattern.spins.iter().map(|(&k, &v)| (k, v)).collect();
    let mut signs = Vec::with_capacity(sites.len() * (sites.len() + 1) / 2);
    for (a, &(i, spin_i)) in sites.iter().enumerate() {
        for &(j, spin_j) in &sites[a..] {
            signs.push(InteractionSign {
                pattern: pattern.name.clone(),
                i,
                j,
                sign: spin_i * spin_j,
            });
        }
    }
    signs
}
