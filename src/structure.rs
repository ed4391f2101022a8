//! Crystal structure collaborator: sites on a periodic cell, the neighbor
//! query the counting pipeline consumes, and sub-species labeling.
//!
//! Labeling never mutates a structure in place. Every labeling function
//! returns a new [`Structure`], so a structure that is being enumerated can
//! never change underneath the enumerator.

use crate::cell::Cell;
use crate::error::{ModelError, Result};
use crate::search;
use nalgebra::Vector3;
use std::collections::HashMap;

/// A neighbor of some center site, as returned by [`NeighborSource::all_neighbors`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighboring site in the structure.
    pub index: usize,
    /// Separation from the center site.
    pub distance: f64,
    /// Lattice translation of the neighbor image, in units of the lattice vectors.
    pub image: Vector3<i32>,
}

/// The contract the pair enumerator consumes.
pub trait NeighborSource {
    /// Total number of sites, used to normalize coefficients.
    fn num_sites(&self) -> usize;

    /// Secondary category label of a site, if one has been assigned.
    fn category_label(&self, index: usize) -> Option<&str>;

    /// Neighbors of every site within `radius`, one list per site in site
    /// order. Periodic images are included, so the same site index may appear
    /// several times in one list.
    fn all_neighbors(&self, radius: f64) -> Vec<Vec<Neighbor>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub species: String,
    pub subspecies: Option<String>,
    pub frac_coords: Vector3<f64>,
}

impl Site {
    pub fn new(species: impl Into<String>, frac_coords: [f64; 3]) -> Self {
        Self {
            species: species.into(),
            subspecies: None,
            frac_coords: Vector3::from(frac_coords),
        }
    }

    pub fn with_subspecies(mut self, label: impl Into<String>) -> Self {
        self.subspecies = Some(label.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Structure {
    cell: Cell,
    sites: Vec<Site>,
}

impl Structure {
    pub fn new(cell: Cell, sites: Vec<Site>) -> Self {
        Self { cell, sites }
    }

    /// Builds a structure from cartesian positions.
    pub fn from_cartesian<S: Into<String>>(
        cell: Cell,
        species: impl IntoIterator<Item = S>,
        positions: &[Vector3<f64>],
    ) -> Self {
        let sites = species
            .into_iter()
            .zip(positions)
            .map(|(sp, pos)| Site {
                species: sp.into(),
                subspecies: None,
                frac_coords: cell.to_fractional(pos),
            })
            .collect();
        Self { cell, sites }
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn site(&self, index: usize) -> Option<&Site> {
        self.sites.get(index)
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn cartesian(&self, index: usize) -> Option<Vector3<f64>> {
        self.sites
            .get(index)
            .map(|s| self.cell.to_cartesian(&s.frac_coords))
    }

    pub fn has_subspecies_labels(&self) -> bool {
        self.sites.iter().all(|s| s.subspecies.is_some())
    }

    fn with_labels(&self, labels: Vec<String>) -> Self {
        let sites = self
            .sites
            .iter()
            .zip(labels)
            .map(|(site, label)| Site {
                subspecies: Some(label),
                ..site.clone()
            })
            .collect();
        Self {
            cell: self.cell.clone(),
            sites,
        }
    }
}

impl NeighborSource for Structure {
    fn num_sites(&self) -> usize {
        self.sites.len()
    }

    fn category_label(&self, index: usize) -> Option<&str> {
        self.sites.get(index)?.subspecies.as_deref()
    }

    fn all_neighbors(&self, radius: f64) -> Vec<Vec<Neighbor>> {
        search::all_neighbors(self, radius)
    }
}

/// Returns a copy of `structure` in which the sites listed in `site_indices`
/// are split into numbered sub-species (`Fe1`, `Fe2`, ... counted per species
/// in site order) and every other site is labeled with its species name.
pub fn label_subspecies(structure: &Structure, site_indices: &[usize]) -> Result<Structure> {
    let num_sites = structure.num_sites();
    if let Some(&index) = site_indices.iter().find(|&&i| i >= num_sites) {
        return Err(ModelError::SiteOutOfRange { index, num_sites });
    }

    let mut counter: HashMap<&str, usize> = HashMap::new();
    let labels = structure
        .sites()
        .iter()
        .enumerate()
        .map(|(index, site)| {
            if site_indices.contains(&index) {
                let k = counter.entry(site.species.as_str()).or_insert(0);
                *k += 1;
                format!("{}{}", site.species, k)
            } else {
                site.species.clone()
            }
        })
        .collect();

    Ok(structure.with_labels(labels))
}

/// Returns a copy of `structure` in which every site of the listed species
/// gets its own numbered sub-lattice label; other sites are labeled with their
/// species name.
pub fn label_sublattices<S: AsRef<str>>(structure: &Structure, species: &[S]) -> Structure {
    let mut counter: HashMap<&str, usize> = HashMap::new();
    let labels = structure
        .sites()
        .iter()
        .map(|site| {
            if species.iter().any(|s| s.as_ref() == site.species) {
                let k = counter.entry(site.species.as_str()).or_insert(0);
                *k += 1;
                format!("{}{}", site.species, k)
            } else {
                site.species.clone()
            }
        })
        .collect();

    structure.with_labels(labels)
}

/// Returns a copy of `structure` in which every unlabeled site is labeled with
/// its species name. Existing labels are kept.
pub fn with_default_subspecies(structure: &Structure) -> Structure {
    let labels = structure
        .sites()
        .iter()
        .map(|s| s.subspecies.clone().unwrap_or_else(|| s.species.clone()))
        .collect();
    structure.with_labels(labels)
}
