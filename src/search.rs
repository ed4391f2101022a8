use crate::cell::Cell;
use crate::config;
use crate::structure::{Neighbor, Structure};
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::info_span;

// Internal tuning parameters
const PARALLEL_TASKS_PER_THREAD: usize = 16;
/// Images closer than this to the center are the center itself.
pub const ZERO_DISTANCE_TOL: f64 = 1e-8;

/// Neighbors of every site of `structure` within `radius` (inclusive),
/// periodic images included.
pub fn all_neighbors(structure: &Structure, radius: f64) -> Vec<Vec<Neighbor>> {
    let _span = info_span!("all_neighbors", n_sites = structure.num_sites(), radius).entered();
    let cell = structure.cell();
    let n_sites = structure.num_sites();

    // Wrapped cartesian positions, so that frac differences stay inside (-1, 1).
    let positions: Vec<Vector3<f64>> = structure
        .sites()
        .iter()
        .map(|s| cell.to_cartesian(&cell.wrap_fractional(&s.frac_coords)))
        .collect();
    let images = lattice_images(cell, radius);

    if n_sites >= config::get_parallel_threshold() {
        let num_threads = rayon::current_num_threads();
        let min_len = (n_sites / (num_threads * PARALLEL_TASKS_PER_THREAD)).max(1);
        (0..n_sites)
            .into_par_iter()
            .with_min_len(min_len)
            .map(|i| site_neighbors(i, &positions, &images, radius))
            .collect()
    } else {
        (0..n_sites)
            .map(|i| site_neighbors(i, &positions, &images, radius))
            .collect()
    }
}

/// Every lattice translation that can bring a site within `radius` of a site
/// in the home cell, paired with its cartesian offset.
fn lattice_images(cell: &Cell, radius: f64) -> Vec<(Vector3<i32>, Vector3<f64>)> {
    let range = cell.image_range(radius);
    let h_matrix = cell.h();
    let mut images = Vec::with_capacity(
        ((2 * range.x + 1) * (2 * range.y + 1) * (2 * range.z + 1)) as usize,
    );
    for sx in -range.x..=range.x {
        for sy in -range.y..=range.y {
            for sz in -range.z..=range.z {
                let shift = Vector3::new(sx, sy, sz);
                let offset = h_matrix * Vector3::new(sx as f64, sy as f64, sz as f64);
                images.push((shift, offset));
            }
        }
    }
    images
}

fn site_neighbors(
    i: usize,
    positions: &[Vector3<f64>],
    images: &[(Vector3<i32>, Vector3<f64>)],
    radius: f64,
) -> Vec<Neighbor> {
    let pos_i = positions[i];
    let mut neighbors = Vec::new();
    for (j, pos_j) in positions.iter().enumerate() {
        let disp = pos_j - pos_i;
        for (shift, offset) in images {
            let distance = (disp + offset).norm();
            if distance <= radius && distance >= ZERO_DISTANCE_TOL {
                neighbors.push(Neighbor {
                    index: j,
                    distance,
                    image: *shift,
                });
            }
        }
    }
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Site;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn simple_cubic() -> Structure {
        let cell = Cell::new(Matrix3::identity(), Vector3::new(true, true, true)).unwrap();
        Structure::new(cell, vec![Site::new("Fe", [0.0, 0.0, 0.0])])
    }

    #[test]
    fn test_simple_cubic_shells() {
        let neighbors = all_neighbors(&simple_cubic(), 1.5);
        assert_eq!(neighbors.len(), 1);
        let first = neighbors[0]
            .iter()
            .filter(|n| (n.distance - 1.0).abs() < 1e-8)
            .count();
        let second = neighbors[0]
            .iter()
            .filter(|n| (n.distance - 2f64.sqrt()).abs() < 1e-8)
            .count();
        assert_eq!(first, 6);
        assert_eq!(second, 12);
        assert_eq!(neighbors[0].len(), 18);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let neighbors = all_neighbors(&simple_cubic(), 1.0);
        assert_eq!(neighbors[0].len(), 6);
    }

    #[test]
    fn test_image_shifts() {
        let neighbors = all_neighbors(&simple_cubic(), 1.0);
        for n in &neighbors[0] {
            assert_eq!(n.index, 0);
            assert_eq!(n.image.abs().sum(), 1);
        }
    }

    #[test]
    fn test_unwrapped_coordinates() {
        let cell = Cell::from_parameters([2.0, 2.0, 2.0], [90.0, 90.0, 90.0]).unwrap();
        let inside = Structure::new(
            cell.clone(),
            vec![
                Site::new("Fe", [0.0, 0.0, 0.0]),
                Site::new("Fe", [0.5, 0.0, 0.0]),
            ],
        );
        let outside = Structure::new(
            cell,
            vec![
                Site::new("Fe", [3.0, -2.0, 0.0]),
                Site::new("Fe", [-1.5, 0.0, 1.0]),
            ],
        );
        let mut a: Vec<f64> = all_neighbors(&inside, 2.5)
            .concat()
            .iter()
            .map(|n| n.distance)
            .collect();
        let mut b: Vec<f64> = all_neighbors(&outside, 2.5)
            .concat()
            .iter()
            .map(|n| n.distance)
            .collect();
        a.sort_by(f64::total_cmp);
        b.sort_by(f64::total_cmp);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_relative_eq!(*x, *y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_non_periodic_cell() {
        let h = Matrix3::identity() * 10.0;
        let cell = Cell::new(h, Vector3::new(false, false, false)).unwrap();
        let structure = Structure::from_cartesian(
            cell,
            ["Fe", "Fe"],
            &[Vector3::new(1.0, 1.0, 1.0), Vector3::new(2.0, 1.0, 1.0)],
        );
        let neighbors = all_neighbors(&structure, 5.0);
        assert_eq!(neighbors[0].len(), 1);
        assert_eq!(neighbors[0][0].index, 1);
        assert_relative_eq!(neighbors[0][0].distance, 1.0);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let cell = Cell::from_parameters([4.0, 4.0, 4.0], [90.0, 90.0, 90.0]).unwrap();
        let mut sites = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    sites.push(Site::new(
                        "Fe",
                        [i as f64 / 4.0, j as f64 / 4.0, k as f64 / 4.0],
                    ));
                }
            }
        }
        let structure = Structure::new(cell, sites);
        let positions: Vec<Vector3<f64>> = (0..structure.num_sites())
            .filter_map(|i| structure.cartesian(i))
            .collect();
        let images = lattice_images(structure.cell(), 1.5);

        let serial: Vec<Vec<Neighbor>> = (0..structure.num_sites())
            .map(|i| site_neighbors(i, &positions, &images, 1.5))
            .collect();
        let parallel = all_neighbors(&structure, 1.5);
        assert_eq!(serial, parallel);
    }
}
