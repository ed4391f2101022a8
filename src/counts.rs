use crate::error::{ModelError, Result};
use crate::pairs::{self, PairRecord};
use crate::shells::ShellTable;
use crate::structure::NeighborSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info_span};

/// Number of pair records sharing a site-index pair, sub-species pair and shell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeighborCountRow {
    pub i: usize,
    pub j: usize,
    pub subspecies_i: String,
    pub subspecies_j: String,
    /// Index into the shell table.
    pub shell: usize,
    pub n: usize,
}

/// One shell as seen by one sub-species pair, ranked by distance within that pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SublatticePair {
    pub subspecies_i: String,
    pub subspecies_j: String,
    pub shell: usize,
    pub distance: f64,
    /// Dense rank starting at 1.
    pub rank: usize,
}

/// Neighbor counts for one structure and cutoff, reusable across any number
/// of magnetic patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborData {
    pub counts: Vec<NeighborCountRow>,
    pub shells: ShellTable,
    pub num_sites: usize,
    pub cutoff: f64,
}

impl NeighborData {
    /// Distinct `(subspecies_i, subspecies_j, shell)` combinations, each with
    /// its distance rank inside its sub-species pair.
    pub fn sublattice_pairs(&self) -> Vec<SublatticePair> {
        let ranks = dense_ranks(
            self.counts.iter().map(|row| {
                (
                    (row.subspecies_i.as_str(), row.subspecies_j.as_str()),
                    row.shell,
                )
            }),
            &self.shells,
        );
        ranks
            .into_iter()
            .map(|(((si, sj), shell), rank)| SublatticePair {
                subspecies_i: si.to_string(),
                subspecies_j: sj.to_string(),
                shell,
                distance: self.shells.get(shell).map_or(f64::NAN, |s| s.radius),
                rank,
            })
            .collect()
    }

    /// Total number of pair records between sites `i` and `j`, over all shells.
    pub fn pair_total(&self, i: usize, j: usize) -> usize {
        self.counts
            .iter()
            .filter(|row| row.i == i && row.j == j)
            .map(|row| row.n)
            .sum()
    }
}

/// Counts neighbors of every site within `r`, grouped over site-index pairs,
/// sub-species pairs and neighbor shells.
pub fn count_neighbors<S: NeighborSource + ?Sized>(
    source: &S,
    r: f64,
    unordered_pairs: bool,
) -> Result<NeighborData> {
    let records = pairs::enumerate_pairs(source, r, unordered_pairs)?;
    let _span = info_span!("count_neighbors", n_records = records.len()).entered();

    let distances: Vec<f64> = records.iter().map(|rec| rec.distance).collect();
    let shells = ShellTable::from_distances(&distances);
    let counts = group_records(&records, &shells)?;

    debug!(
        n_shells = shells.len(),
        n_groups = counts.len(),
        "binned neighbor distances"
    );
    Ok(NeighborData {
        counts,
        shells,
        num_sites: source.num_sites(),
        cutoff: r,
    })
}

/// Assigns each record to its shell and counts records per group. Rows come
/// out sorted by `(i, j, subspecies_i, subspecies_j, shell)`.
pub fn group_records(records: &[PairRecord], shells: &ShellTable) -> Result<Vec<NeighborCountRow>> {
    let mut groups: BTreeMap<(usize, usize, &str, &str, usize), usize> = BTreeMap::new();
    for rec in records {
        let shell = shells
            .locate(rec.distance)
            .ok_or(ModelError::UnbinnedDistance(rec.distance))?;
        *groups
            .entry((
                rec.i,
                rec.j,
                rec.subspecies_i.as_str(),
                rec.subspecies_j.as_str(),
                shell,
            ))
            .or_insert(0) += 1;
    }

    Ok(groups
        .into_iter()
        .map(|((i, j, si, sj, shell), n)| NeighborCountRow {
            i,
            j,
            subspecies_i: si.to_string(),
            subspecies_j: sj.to_string(),
            shell,
            n,
        })
        .collect())
}

/// Dense rank of shells by radius within each group key. Equal radii share a
/// rank; ranks start at 1 and have no gaps.
pub(crate) fn dense_ranks<K: Ord + Clone>(
    entries: impl IntoIterator<Item = (K, usize)>,
    shells: &ShellTable,
) -> BTreeMap<(K, usize), usize> {
    let mut members: BTreeMap<K, BTreeSet<usize>> = BTreeMap::new();
    for (key, shell) in entries {
        members.entry(key).or_default().insert(shell);
    }

    let radius = |shell: usize| shells.get(shell).map_or(f64::NAN, |s| s.radius);
    let mut ranks = BTreeMap::new();
    for (key, group) in members {
        let mut ordered: Vec<usize> = group.into_iter().collect();
        ordered.sort_by(|&a, &b| radius(a).total_cmp(&radius(b)).then(a.cmp(&b)));

        let mut rank = 0;
        let mut previous: Option<f64> = None;
        for shell in ordered {
            let r = radius(shell);
            if previous != Some(r) {
                rank += 1;
                previous = Some(r);
            }
            ranks.insert((key.clone(), shell), rank);
        }
    }
    ranks
}
