//! Neighbor-shell counting and pairwise exchange-model coefficients for
//! crystal lattices.
//!
//! The pipeline runs in two stages. [`count_neighbors`] enumerates every
//! labeled site pair within a cutoff, bins the distances into shells and
//! counts pairs per shell. [`build_model`] then combines those counts with
//! any number of [`MagneticPattern`]s into per-pattern coefficients of the
//! `J` parameters of a Heisenberg-type model.

pub mod cell;
pub mod config;
pub mod counts;
pub mod error;
pub mod model;
pub mod pairs;
pub mod patterns;
#[cfg(feature = "python")]
pub mod python_api;
pub mod search;
pub mod shells;
pub mod structure;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use cell::{Cell, CellError};
pub use counts::{NeighborCountRow, NeighborData, SublatticePair, count_neighbors};
pub use error::{ModelError, Result};
pub use model::{DistanceFilter, InteractionModel, build_model};
pub use pairs::{PairRecord, enumerate_pairs};
pub use patterns::{InteractionSign, MagneticPattern, interaction_signs};
pub use shells::{Shell, ShellTable};
pub use structure::{
    Neighbor, NeighborSource, Site, Structure, label_sublattices, label_subspecies,
    with_default_subspecies,
};

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. `RUST_LOG` wins over `level`,
/// which defaults to `info`. Calling it again is a no-op.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
