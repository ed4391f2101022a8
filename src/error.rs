use crate::cell::CellError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Cutoff must be positive and finite, got {0}")]
    InvalidCutoff(f64),
    #[error("Site {site} has no sub-species label; label the structure before counting neighbors")]
    MissingSubspecies { site: usize },
    #[error("Site index {index} is out of range for a structure with {num_sites} sites")]
    SiteOutOfRange { index: usize, num_sites: usize },
    #[error("Neighbor source returned {lists} neighbor lists for {num_sites} sites")]
    NeighborListCount { lists: usize, num_sites: usize },
    #[error("Distance {0} does not fall inside any neighbor shell")]
    UnbinnedDistance(f64),
    #[error("Magnetic pattern '{0}' is defined more than once")]
    DuplicatePattern(String),
    #[error("Magnetic pattern '{pattern}' assigns a spin to site {site}, but the structure has {num_sites} sites")]
    UnknownSite {
        pattern: String,
        site: usize,
        num_sites: usize,
    },
    #[error("Magnetic pattern '{pattern}' has no interaction sign for site pair ({i}, {j})")]
    UnjoinableSitePair { pattern: String, i: usize, j: usize },
    #[error(transparent)]
    Cell(#[from] CellError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
