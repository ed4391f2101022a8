use crate::cell::Cell;
use crate::config;
use crate::counts::{self, NeighborData};
use crate::model::{self, DistanceFilter, InteractionModel};
use crate::patterns::MagneticPattern;
use crate::structure::{self, Site, Structure};
use nalgebra::{Matrix3, Vector3};
use numpy::{PyArray2, PyArrayMethods, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::BTreeMap;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

#[pyclass(name = "Structure")]
pub struct PyStructure {
    pub(crate) inner: Structure,
}

enum PositionData<'a> {
    Slice(&'a [Vector3<f64>]),
    Owned(Vec<Vector3<f64>>),
}

impl<'a> std::ops::Deref for PositionData<'a> {
    type Target = [Vector3<f64>];
    fn deref(&self) -> &Self::Target {
        match self {
            Self::Slice(s) => s,
            Self::Owned(v) => v,
        }
    }
}

fn get_positions<'a>(positions: &'a PyReadonlyArray2<'a, f64>) -> PyResult<PositionData<'a>> {
    if positions.shape()[1] != 3 {
        return Err(PyValueError::new_err("Coordinates must be (N, 3)"));
    }

    if let Ok(slice) = positions.as_slice()
        && let Ok(cast_slice) = bytemuck::try_cast_slice(slice)
    {
        return Ok(PositionData::Slice(cast_slice));
    }

    // Non-contiguous input
    let view = positions.as_array();
    let rows = view
        .rows()
        .into_iter()
        .map(|row| Vector3::new(row[0], row[1], row[2]))
        .collect();
    Ok(PositionData::Owned(rows))
}

fn build_sites(
    species: Vec<String>,
    frac_coords: &[Vector3<f64>],
    subspecies: Option<Vec<String>>,
) -> PyResult<Vec<Site>> {
    if species.len() != frac_coords.len() {
        return Err(PyValueError::new_err(format!(
            "Got {} species for {} sites",
            species.len(),
            frac_coords.len()
        )));
    }
    if let Some(labels) = &subspecies
        && labels.len() != species.len()
    {
        return Err(PyValueError::new_err(format!(
            "Got {} sub-species labels for {} sites",
            labels.len(),
            species.len()
        )));
    }

    let mut labels = subspecies.map(Vec::into_iter);
    Ok(species
        .into_iter()
        .zip(frac_coords)
        .map(|(sp, frac)| {
            let site = Site::new(sp, [frac.x, frac.y, frac.z]);
            match labels.as_mut().and_then(Iterator::next) {
                Some(label) => site.with_subspecies(label),
                None => site,
            }
        })
        .collect())
}

#[pymethods]
impl PyStructure {
    /// `lattice` holds the lattice vectors as rows.
    #[new]
    #[pyo3(signature = (lattice, species, frac_coords, subspecies=None, pbc=None))]
    fn new(
        lattice: Vec<Vec<f64>>,
        species: Vec<String>,
        frac_coords: PyReadonlyArray2<'_, f64>,
        subspecies: Option<Vec<String>>,
        pbc: Option<[bool; 3]>,
    ) -> PyResult<Self> {
        if lattice.len() != 3 || lattice.iter().any(|r| r.len() != 3) {
            return Err(PyValueError::new_err("Lattice must be 3x3"));
        }
        // Rows in, lattice vectors as columns internally
        let h = Matrix3::new(
            lattice[0][0],
            lattice[1][0],
            lattice[2][0],
            lattice[0][1],
            lattice[1][1],
            lattice[2][1],
            lattice[0][2],
            lattice[1][2],
            lattice[2][2],
        );
        let pbc = pbc.unwrap_or([true; 3]);
        let cell = Cell::new(h, Vector3::new(pbc[0], pbc[1], pbc[2])).map_err(value_error)?;

        let coords = get_positions(&frac_coords)?;
        let sites = build_sites(species, &coords, subspecies)?;
        Ok(PyStructure {
            inner: Structure::new(cell, sites),
        })
    }

    /// Structure on a cell given by lengths and angles in degrees.
    #[staticmethod]
    #[pyo3(signature = (lengths, angles, species, frac_coords, subspecies=None))]
    fn from_parameters(
        lengths: [f64; 3],
        angles: [f64; 3],
        species: Vec<String>,
        frac_coords: PyReadonlyArray2<'_, f64>,
        subspecies: Option<Vec<String>>,
    ) -> PyResult<Self> {
        let cell = Cell::from_parameters(lengths, angles).map_err(value_error)?;
        let coords = get_positions(&frac_coords)?;
        let sites = build_sites(species, &coords, subspecies)?;
        Ok(PyStructure {
            inner: Structure::new(cell, sites),
        })
    }

    #[getter]
    fn num_sites(&self) -> usize {
        self.inner.num_sites()
    }

    #[getter]
    fn species(&self) -> Vec<String> {
        self.inner.sites().iter().map(|s| s.species.clone()).collect()
    }

    #[getter]
    fn subspecies(&self) -> Vec<Option<String>> {
        self.inner
            .sites()
            .iter()
            .map(|s| s.subspecies.clone())
            .collect()
    }

    #[getter]
    fn lattice(&self) -> [[f64; 3]; 3] {
        let h = self.inner.cell().h();
        [0, 1, 2].map(|k| [h[(0, k)], h[(1, k)], h[(2, k)]])
    }

    #[getter]
    fn frac_coords<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let n = self.inner.num_sites();
        let flat: Vec<f64> = self
            .inner
            .sites()
            .iter()
            .flat_map(|s| [s.frac_coords.x, s.frac_coords.y, s.frac_coords.z])
            .collect();
        numpy::PyArray1::from_vec(py, flat).reshape((n, 3))
    }

    /// Labels `site_indices` with numbered sub-species of their species.
    fn label_subspecies(&self, site_indices: Vec<usize>) -> PyResult<Self> {
        let inner = structure::label_subspecies(&self.inner, &site_indices).map_err(value_error)?;
        Ok(PyStructure { inner })
    }

    fn label_sublattices(&self, species: Vec<String>) -> Self {
        PyStructure {
            inner: structure::label_sublattices(&self.inner, &species),
        }
    }

    fn __len__(&self) -> usize {
        self.inner.num_sites()
    }

    fn __repr__(&self) -> String {
        let (lengths, angles) = self.inner.cell().lattice_parameters();
        format!(
            "Structure(num_sites={}, abc=[{:.4}, {:.4}, {:.4}], angles=[{:.2}, {:.2}, {:.2}])",
            self.inner.num_sites(),
            lengths[0],
            lengths[1],
            lengths[2],
            angles[0],
            angles[1],
            angles[2]
        )
    }
}

#[pyclass(name = "NeighborData")]
pub struct PyNeighborData {
    pub(crate) inner: NeighborData,
}

#[pymethods]
impl PyNeighborData {
    #[getter]
    fn num_sites(&self) -> usize {
        self.inner.num_sites
    }

    #[getter]
    fn cutoff(&self) -> f64 {
        self.inner.cutoff
    }

    #[getter]
    fn shell_radii(&self) -> Vec<f64> {
        self.inner.shells.radii()
    }

    /// `(lower, upper]` interval of every shell.
    #[getter]
    fn shell_bounds(&self) -> Vec<(f64, f64)> {
        self.inner
            .shells
            .shells()
            .iter()
            .map(|s| (s.lower, s.upper))
            .collect()
    }

    /// Count rows as a dict of columns.
    fn counts<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let rows = &self.inner.counts;
        let radius = |shell: usize| self.inner.shells.get(shell).map_or(f64::NAN, |s| s.radius);
        let dict = PyDict::new(py);
        dict.set_item("i", rows.iter().map(|r| r.i).collect::<Vec<_>>())?;
        dict.set_item("j", rows.iter().map(|r| r.j).collect::<Vec<_>>())?;
        dict.set_item(
            "subspecies_i",
            rows.iter().map(|r| r.subspecies_i.as_str()).collect::<Vec<_>>(),
        )?;
        dict.set_item(
            "subspecies_j",
            rows.iter().map(|r| r.subspecies_j.as_str()).collect::<Vec<_>>(),
        )?;
        dict.set_item("shell", rows.iter().map(|r| r.shell).collect::<Vec<_>>())?;
        dict.set_item(
            "distance",
            rows.iter().map(|r| radius(r.shell)).collect::<Vec<_>>(),
        )?;
        dict.set_item("n", rows.iter().map(|r| r.n).collect::<Vec<_>>())?;
        Ok(dict)
    }

    fn sublattice_pairs<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let pairs = self.inner.sublattice_pairs();
        let dict = PyDict::new(py);
        dict.set_item(
            "subspecies_i",
            pairs.iter().map(|p| p.subspecies_i.as_str()).collect::<Vec<_>>(),
        )?;
        dict.set_item(
            "subspecies_j",
            pairs.iter().map(|p| p.subspecies_j.as_str()).collect::<Vec<_>>(),
        )?;
        dict.set_item("distance", pairs.iter().map(|p| p.distance).collect::<Vec<_>>())?;
        dict.set_item("rank", pairs.iter().map(|p| p.rank).collect::<Vec<_>>())?;
        Ok(dict)
    }

    fn pair_total(&self, i: usize, j: usize) -> usize {
        self.inner.pair_total(i, j)
    }

    fn __len__(&self) -> usize {
        self.inner.counts.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "NeighborData(num_sites={}, cutoff={}, shells={}, rows={})",
            self.inner.num_sites,
            self.inner.cutoff,
            self.inner.shells.len(),
            self.inner.counts.len()
        )
    }
}

/// Sites without a sub-species are labeled with their species first.
#[pyfunction]
#[pyo3(signature = (structure, r, unordered_pairs=true))]
fn count_neighbors(
    structure: &PyStructure,
    r: f64,
    unordered_pairs: bool,
) -> PyResult<PyNeighborData> {
    let labeled = structure::with_default_subspecies(&structure.inner);
    let inner = counts::count_neighbors(&labeled, r, unordered_pairs).map_err(value_error)?;
    Ok(PyNeighborData { inner })
}

/// Spins of one pattern, either one per site in site order or keyed by site
/// index.
#[derive(FromPyObject)]
enum SpinAssignment {
    Dense(Vec<f64>),
    Sparse(BTreeMap<usize, f64>),
}

impl SpinAssignment {
    fn into_pattern(self, name: &str) -> MagneticPattern {
        match self {
            Self::Dense(spins) => MagneticPattern::from_spins(name, &spins),
            Self::Sparse(spins) => MagneticPattern::new(name, spins),
        }
    }
}

fn model_columns<'py>(py: Python<'py>, model: &InteractionModel) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("pattern", model.patterns().to_vec())?;
    for parameter in model.parameters() {
        dict.set_item(parameter, model.column(parameter))?;
    }
    Ok(dict)
}

/// Returns `{"pattern": [...], parameter: [...], ...}` with `None` where a
/// pattern has no value for a parameter.
#[pyfunction]
#[pyo3(signature = (neighbor_data, magnetic_patterns, distance_filter=None))]
fn build_model<'py>(
    py: Python<'py>,
    neighbor_data: &PyNeighborData,
    magnetic_patterns: BTreeMap<String, SpinAssignment>,
    distance_filter: Option<BTreeMap<String, Vec<f64>>>,
) -> PyResult<Bound<'py, PyDict>> {
    let patterns: Vec<MagneticPattern> = magnetic_patterns
        .into_iter()
        .map(|(name, spins)| spins.into_pattern(&name))
        .collect();
    let filter = distance_filter.map(|groups| groups.into_iter().collect::<DistanceFilter>());

    let result = model::build_model(&neighbor_data.inner, &patterns, filter.as_ref())
        .map_err(value_error)?;
    model_columns(py, &result)
}

#[pyfunction]
fn get_num_threads() -> usize {
    rayon::current_num_threads()
}

#[pyfunction]
fn set_num_threads(n: usize) -> PyResult<()> {
    // The global pool can only be built once; later calls are ignored.
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build_global();
    Ok(())
}

#[pyfunction]
fn get_parallel_threshold() -> usize {
    config::get_parallel_threshold()
}

#[pyfunction]
fn set_parallel_threshold(val: usize) {
    config::set_parallel_threshold(val);
}

#[pyfunction]
fn get_pattern_parallel_threshold() -> usize {
    config::get_pattern_parallel_threshold()
}

#[pyfunction]
fn set_pattern_parallel_threshold(val: usize) {
    config::set_pattern_parallel_threshold(val);
}

#[pyfunction]
#[pyo3(signature = (level=None))]
fn init_logging(level: Option<String>) {
    crate::init_logging(level.as_deref());
}

#[pymodule]
fn neighbormodels_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStructure>()?;
    m.add_class::<PyNeighborData>()?;
    m.add_function(wrap_pyfunction!(count_neighbors, m)?)?;
    m.add_function(wrap_pyfunction!(build_model, m)?)?;
    m.add_function(wrap_pyfunction!(get_num_threads, m)?)?;
    m.add_function(wrap_pyfunction!(set_num_threads, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add_function(wrap_pyfunction!(get_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(set_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(get_pattern_parallel_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(set_pattern_parallel_threshold, m)?)?;
    Ok(())
}
