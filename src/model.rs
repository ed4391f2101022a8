//! Exchange-model coefficients from neighbor counts and magnetic patterns.
//!
//! Every neighbor count row is joined with the interaction sign of its site
//! pair, optionally restricted to named groups of shells, ranked by distance
//! inside its sub-species pair and labeled with a parameter name such as
//! `J1`, `J2_FeMn` or `Jcore3`. The signed counts are then summed per
//! `(pattern, parameter)` and normalized by the number of sites.

use crate::config;
use crate::counts::{NeighborCountRow, NeighborData, dense_ranks};
use crate::error::{ModelError, Result};
use crate::patterns::{MagneticPattern, interaction_signs};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info_span, warn};

/// Named groups of shells to keep in the model. A shell belongs to a group
/// when any of the group's distances falls inside the shell's interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceFilter {
    groups: BTreeMap<String, Vec<f64>>,
}

impl DistanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(
        mut self,
        label: impl Into<String>,
        distances: impl IntoIterator<Item = f64>,
    ) -> Self {
        self.insert(label, distances);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, distances: impl IntoIterator<Item = f64>) {
        self.groups
            .entry(label.into())
            .or_default()
            .extend(distances);
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.groups
    }

    /// `(label, distance)` for every listed distance beyond `cutoff`. Such
    /// distances can never select a shell counted up to that cutoff.
    pub fn distances_beyond(&self, cutoff: f64) -> Vec<(&str, f64)> {
        self.groups
            .iter()
            .flat_map(|(label, distances)| {
                distances
                    .iter()
                    .filter(move |&&d| d > cutoff)
                    .map(move |&d| (label.as_str(), d))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<L, I> FromIterator<(L, I)> for DistanceFilter
where
    L: Into<String>,
    I: IntoIterator<Item = f64>,
{
    fn from_iter<T: IntoIterator<Item = (L, I)>>(iter: T) -> Self {
        let mut filter = Self::new();
        for (label, distances) in iter {
            filter.insert(label, distances);
        }
        filter
    }
}

/// Wide table of model coefficients: one row per pattern, one column per
/// parameter. Missing combinations have no value rather than zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionModel {
    patterns: Vec<String>,
    parameters: Vec<String>,
    coefficients: BTreeMap<String, BTreeMap<String, f64>>,
}

impl InteractionModel {
    /// Pattern names, sorted.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Parameter names, sorted.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn get(&self, pattern: &str, parameter: &str) -> Option<f64> {
        self.coefficients.get(pattern)?.get(parameter).copied()
    }

    /// Coefficients of `pattern` in parameter order.
    pub fn row(&self, pattern: &str) -> Option<Vec<Option<f64>>> {
        let values = self.coefficients.get(pattern)?;
        Some(
            self.parameters
                .iter()
                .map(|p| values.get(p).copied())
                .collect(),
        )
    }

    /// Coefficients of `parameter` in pattern order.
    pub fn column(&self, parameter: &str) -> Vec<Option<f64>> {
        self.patterns
            .iter()
            .map(|p| self.get(p, parameter))
            .collect()
    }

    /// `(pattern, parameter, coefficient)` for every present value, sorted by
    /// pattern and then parameter.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.coefficients.iter().flat_map(|(pattern, values)| {
            values
                .iter()
                .map(move |(param, &c)| (pattern.as_str(), param.as_str(), c))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

impl fmt::Display for InteractionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pattern")?;
        for p in &self.parameters {
            write!(f, "\t{}", p)?;
        }
        writeln!(f)?;
        for pattern in &self.patterns {
            write!(f, "{}", pattern)?;
            for value in self.row(pattern).unwrap_or_default() {
                match value {
                    Some(v) => write!(f, "\t{}", v)?,
                    None => write!(f, "\t-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A count row tagged with its filter group.
struct TaggedRow<'a> {
    row: &'a NeighborCountRow,
    label: &'a str,
}

/// Builds the interaction model for `patterns` on top of precomputed
/// neighbor counts.
pub fn build_model(
    data: &NeighborData,
    patterns: &[MagneticPattern],
    distance_filter: Option<&DistanceFilter>,
) -> Result<InteractionModel> {
    let _span = info_span!(
        "build_model",
        n_patterns = patterns.len(),
        n_rows = data.counts.len()
    )
    .entered();

    validate_patterns(patterns, data.num_sites)?;

    let tagged = apply_distance_filter(data, distance_filter);
    let (names, terms) = label_interaction_parameters(&tagged, data);
    debug!(n_parameters = names.len(), "labeled interaction parameters");

    let aggregate = |pattern: &MagneticPattern| {
        aggregate_interaction_coefficients(pattern, &terms, &names, data.num_sites)
    };
    let rows: Vec<(String, BTreeMap<String, f64>)> =
        if patterns.len() >= config::get_pattern_parallel_threshold() {
            patterns.par_iter().map(aggregate).collect::<Result<_>>()?
        } else {
            patterns.iter().map(aggregate).collect::<Result<_>>()?
        };

    let coefficients: BTreeMap<String, BTreeMap<String, f64>> = rows.into_iter().collect();
    Ok(InteractionModel {
        patterns: coefficients.keys().cloned().collect(),
        parameters: names,
        coefficients,
    })
}

fn validate_patterns(patterns: &[MagneticPattern], num_sites: usize) -> Result<()> {
    let mut seen = BTreeSet::new();
    for pattern in patterns {
        if !seen.insert(pattern.name.as_str()) {
            return Err(ModelError::DuplicatePattern(pattern.name.clone()));
        }
        if let Some((&site, _)) = pattern.spins.range(num_sites..).next() {
            return Err(ModelError::UnknownSite {
                pattern: pattern.name.clone(),
                site,
                num_sites,
            });
        }
    }
    Ok(())
}

/// Tags the count rows with filter labels. With several groups a row is
/// repeated once per matching group; with one group (or none) the label is
/// empty.
fn apply_distance_filter<'a>(
    data: &'a NeighborData,
    distance_filter: Option<&'a DistanceFilter>,
) -> Vec<TaggedRow<'a>> {
    let filter = match distance_filter {
        Some(f) if !f.is_empty() => f,
        _ => {
            return data
                .counts
                .iter()
                .map(|row| TaggedRow { row, label: "" })
                .collect();
        }
    };

    for (label, distance) in filter.distances_beyond(data.cutoff) {
        warn!(
            filter_label = %label,
            distance,
            cutoff = data.cutoff,
            "distance filter entry lies beyond the neighbor cutoff"
        );
    }

    let multiple = filter.len() > 1;
    let mut tagged = Vec::new();
    for (label, distances) in filter.groups() {
        let selected: BTreeSet<usize> = distances
            .iter()
            .filter_map(|&d| data.shells.locate(d))
            .collect();
        let before = tagged.len();
        tagged.extend(
            data.counts
                .iter()
                .filter(|row| selected.contains(&row.shell))
                .map(|row| TaggedRow {
                    row,
                    label: if multiple { label.as_str() } else { "" },
                }),
        );
        if tagged.len() == before {
            warn!(filter_label = %label, ?distances, "distance filter group selects no neighbor shells");
        }
    }
    tagged
}

/// Assigns a parameter name to every tagged row. Returns the sorted distinct
/// names and, per row, the index of its name.
fn label_interaction_parameters<'a>(
    tagged: &[TaggedRow<'a>],
    data: &NeighborData,
) -> (Vec<String>, Vec<(&'a NeighborCountRow, usize)>) {
    let ranks = dense_ranks(
        tagged.iter().map(|t| {
            (
                (
                    t.label,
                    t.row.subspecies_i.as_str(),
                    t.row.subspecies_j.as_str(),
                ),
                t.row.shell,
            )
        }),
        &data.shells,
    );

    // The sub-species suffix is all or nothing across the whole model.
    let single_specie = tagged
        .iter()
        .all(|t| t.row.subspecies_i == t.row.subspecies_j);

    let parameter_name = |t: &TaggedRow<'a>| {
        let key = (
            (
                t.label,
                t.row.subspecies_i.as_str(),
                t.row.subspecies_j.as_str(),
            ),
            t.row.shell,
        );
        let rank = ranks.get(&key).copied().unwrap_or_default();
        if single_specie {
            format!("J{}{}", t.label, rank)
        } else {
            format!(
                "J{}{}_{}{}",
                t.label, rank, t.row.subspecies_i, t.row.subspecies_j
            )
        }
    };

    let row_names: Vec<String> = tagged.iter().map(parameter_name).collect();
    let names: Vec<String> = row_names
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(k, name)| (name.as_str(), k))
        .collect();

    let terms = tagged
        .iter()
        .zip(&row_names)
        .map(|(t, name)| (t.row, index[name.as_str()]))
        .collect();
    (names, terms)
}

/// Sums `sign * n` per parameter for one pattern and normalizes by the site
/// count.
fn aggregate_interaction_coefficients(
    pattern: &MagneticPattern,
    terms: &[(&NeighborCountRow, usize)],
    names: &[String],
    num_sites: usize,
) -> Result<(String, BTreeMap<String, f64>)> {
    let signs: HashMap<(usize, usize), f64> = interaction_signs(pattern)
        .into_iter()
        .map(|s| ((s.i, s.j), s.sign))
        .collect();

    let mut sums: Vec<Option<f64>> = vec![None; names.len()];
    for &(row, k) in terms {
        // Signs are symmetric, so ordered pairs join on their canonical form.
        let key = (row.i.min(row.j), row.i.max(row.j));
        let sign = signs
            .get(&key)
            .ok_or_else(|| ModelError::UnjoinableSitePair {
                pattern: pattern.name.clone(),
                i: row.i,
                j: row.j,
            })?;
        *sums[k].get_or_insert(0.0) += sign * row.n as f64;
    }

    let values = names
        .iter()
        .zip(sums)
        .filter_map(|(name, sum)| sum.map(|s| (name.clone(), s / num_sites as f64)))
        .collect();
    Ok((pattern.name.clone(), values))
}
