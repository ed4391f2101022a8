use crate::error::{ModelError, Result};
use crate::structure::NeighborSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

/// One observed neighbor relation. Periodic images of the same physical pair
/// are separate records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub i: usize,
    pub j: usize,
    /// Lexically smaller sub-species of the pair.
    pub subspecies_i: String,
    pub subspecies_j: String,
    pub distance: f64,
}

pub(crate) fn validate_cutoff(r: f64) -> Result<()> {
    if !r.is_finite() || r <= 0.0 {
        return Err(ModelError::InvalidCutoff(r));
    }
    Ok(())
}

/// Enumerates every neighbor relation within `r`.
///
/// With `unordered_pairs` the site indices of each record are sorted so that
/// `i <= j`; otherwise `i` is always the center site. The sub-species pair is
/// always sorted. Fails if any site lacks a sub-species label.
pub fn enumerate_pairs<S: NeighborSource + ?Sized>(
    source: &S,
    r: f64,
    unordered_pairs: bool,
) -> Result<Vec<PairRecord>> {
    validate_cutoff(r)?;
    let _span = info_span!("enumerate_pairs", n_sites = source.num_sites(), r).entered();

    let labels: Vec<&str> = (0..source.num_sites())
        .map(|site| {
            source
                .category_label(site)
                .ok_or(ModelError::MissingSubspecies { site })
        })
        .collect::<Result<_>>()?;

    let all_neighbors = source.all_neighbors(r);
    if all_neighbors.len() != labels.len() {
        return Err(ModelError::NeighborListCount {
            lists: all_neighbors.len(),
            num_sites: labels.len(),
        });
    }
    let capacity = all_neighbors.iter().map(Vec::len).sum();
    let mut records = Vec::with_capacity(capacity);

    for (i, (neighbors, &label_i)) in all_neighbors.iter().zip(&labels).enumerate() {
        for neighbor in neighbors {
            let j = neighbor.index;
            let label_j = *labels.get(j).ok_or(ModelError::SiteOutOfRange {
                index: j,
                num_sites: labels.len(),
            })?;

            let (subspecies_i, subspecies_j) = if label_i <= label_j {
                (label_i, label_j)
            } else {
                (label_j, label_i)
            };
            let (i, j) = if unordered_pairs && j < i { (j, i) } else { (i, j) };

            records.push(PairRecord {
                i,
                j,
                subspecies_i: subspecies_i.to_string(),
                subspecies_j: subspecies_j.to_string(),
                distance: neighbor.distance,
            });
        }
    }

    debug!(n_records = records.len(), "enumerated neighbor pairs");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::structure::{Neighbor, Site, Structure, label_subspecies};
    use nalgebra::{Matrix3, Vector3};

    fn two_species_cell() -> Structure {
        let cell = Cell::new(Matrix3::identity(), Vector3::new(true, true, true)).unwrap();
        let s = Structure::new(
            cell,
            vec![
                Site::new("Mn", [0.0, 0.0, 0.0]),
                Site::new("Fe", [0.5, 0.5, 0.5]),
            ],
        );
        label_subspecies(&s, &[]).unwrap()
    }

    #[test]
    fn test_missing_label_is_an_error() {
        let cell = Cell::from_parameters([1.0, 1.0, 1.0], [90.0, 90.0, 90.0]).unwrap();
        let s = Structure::new(cell, vec![Site::new("Fe", [0.0, 0.0, 0.0])]);
        let err = enumerate_pairs(&s, 1.5, true).unwrap_err();
        assert_eq!(err, ModelError::MissingSubspecies { site: 0 });
    }

    #[test]
    fn test_invalid_cutoff() {
        let s = two_species_cell();
        assert!(matches!(
            enumerate_pairs(&s, 0.0, true),
            Err(ModelError::InvalidCutoff(_))
        ));
        assert!(enumerate_pairs(&s, f64::NAN, true).is_err());
    }

    #[test]
    fn test_unordered_pairs_are_canonical() {
        let records = enumerate_pairs(&two_species_cell(), 1.0, true).unwrap();
        assert!(!records.is_empty());
        for r in &records {
            assert!(r.i <= r.j);
            assert!(r.subspecies_i <= r.subspecies_j);
        }
        let cross: Vec<_> = records.iter().filter(|r| r.i != r.j).collect();
        // 8 body-diagonal neighbors seen from each of the two sites.
        assert_eq!(cross.len(), 16);
        assert!(
            cross
                .iter()
                .all(|r| r.subspecies_i == "Fe" && r.subspecies_j == "Mn")
        );
    }

    #[test]
    fn test_ordered_pairs_keep_center_first() {
        let records = enumerate_pairs(&two_species_cell(), 0.9, false).unwrap();
        assert_eq!(records.iter().filter(|r| r.i == 1 && r.j == 0).count(), 8);
        assert_eq!(records.iter().filter(|r| r.i == 0 && r.j == 1).count(), 8);
    }

    /// Neighbor source with a fixed answer, whatever the radius.
    struct FixedSource {
        labels: Vec<&'static str>,
        lists: Vec<Vec<Neighbor>>,
    }

    impl NeighborSource for FixedSource {
        fn num_sites(&self) -> usize {
            self.labels.len()
        }

        fn category_label(&self, index: usize) -> Option<&str> {
            self.labels.get(index).copied()
        }

        fn all_neighbors(&self, _radius: f64) -> Vec<Vec<Neighbor>> {
            self.lists.clone()
        }
    }

    fn neighbor(index: usize) -> Neighbor {
        Neighbor {
            index,
            distance: 1.0,
            image: Vector3::zeros(),
        }
    }

    #[test]
    fn test_extra_neighbor_lists_are_rejected() {
        let source = FixedSource {
            labels: vec!["Fe"],
            lists: vec![vec![neighbor(0)], vec![neighbor(0)]],
        };
        let err = enumerate_pairs(&source, 2.0, true).unwrap_err();
        assert_eq!(
            err,
            ModelError::NeighborListCount {
                lists: 2,
                num_sites: 1
            }
        );
    }

    #[test]
    fn test_missing_neighbor_lists_are_rejected() {
        let source = FixedSource {
            labels: vec!["Fe", "Mn"],
            lists: vec![vec![neighbor(1)]],
        };
        assert!(matches!(
            enumerate_pairs(&source, 2.0, false),
            Err(ModelError::NeighborListCount { lists: 1, .. })
        ));
    }

    #[test]
    fn test_neighbor_index_out_of_range() {
        let source = FixedSource {
            labels: vec!["Fe"],
            lists: vec![vec![neighbor(5)]],
        };
        let err = enumerate_pairs(&source, 2.0, true).unwrap_err();
        assert_eq!(
            err,
            ModelError::SiteOutOfRange {
                index: 5,
                num_sites: 1
            }
        );
    }

    #[test]
    fn test_enumeration_is_idempotent() {
        let s = two_species_cell();
        let a = enumerate_pairs(&s, 1.8, true).unwrap();
        let b = enumerate_pairs(&s, 1.8, true).unwrap();
        assert_eq!(a, b);
    }
}
