use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellError {
    #[error("Cell matrix is not invertible")]
    NotInvertible,
    #[error("Invalid lattice parameters: {0}")]
    InvalidParameters(String),
}

/// A lattice cell. The columns of `h` are the lattice vectors, so that
/// `cart = h * frac`.
#[derive(Clone, Debug)]
pub struct Cell {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
    pbc: Vector3<bool>,
}

impl Cell {
    pub fn new(h: Matrix3<f64>, pbc: Vector3<bool>) -> Result<Self, CellError> {
        let h_inv = h.try_inverse().ok_or(CellError::NotInvertible)?;
        Ok(Self { h, h_inv, pbc })
    }

    /// Fully periodic cell from the three lattice vectors.
    pub fn from_vectors(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Result<Self, CellError> {
        let h = Matrix3::from_columns(&[
            Vector3::from(a),
            Vector3::from(b),
            Vector3::from(c),
        ]);
        Self::new(h, Vector3::new(true, true, true))
    }

    /// Fully periodic cell from lengths `[a, b, c]` and angles
    /// `[alpha, beta, gamma]` in degrees. `a` lies along x and `b` in the
    /// xy-plane.
    pub fn from_parameters(lengths: [f64; 3], angles: [f64; 3]) -> Result<Self, CellError> {
        if lengths.iter().any(|&l| !l.is_finite() || l <= 0.0) {
            return Err(CellError::InvalidParameters(format!(
                "lengths must be positive and finite, got {:?}",
                lengths
            )));
        }
        let [a, b, c] = lengths;
        let [alpha, beta, gamma] = angles.map(f64::to_radians);

        let (cos_alpha, cos_beta, cos_gamma) = (alpha.cos(), beta.cos(), gamma.cos());
        let sin_gamma = gamma.sin();
        if sin_gamma.abs() < f64::EPSILON {
            return Err(CellError::InvalidParameters(
                "gamma must not be 0 or 180 degrees".to_string(),
            ));
        }

        let cx = c * cos_beta;
        let cy = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let cz_sq = c * c - cx * cx - cy * cy;
        if cz_sq <= 0.0 {
            return Err(CellError::InvalidParameters(format!(
                "angles {:?} do not describe a three-dimensional cell",
                angles
            )));
        }

        Self::from_vectors(
            [a, 0.0, 0.0],
            [b * cos_gamma, b * sin_gamma, 0.0],
            [cx, cy, cz_sq.sqrt()],
        )
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.h_inv * cart
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.h * frac
    }

    pub fn h(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn h_inv(&self) -> &Matrix3<f64> {
        &self.h_inv
    }

    pub fn pbc(&self) -> &Vector3<bool> {
        &self.pbc
    }

    pub fn volume(&self) -> f64 {
        self.h.determinant().abs()
    }

    /// `([a, b, c], [alpha, beta, gamma])` with angles in degrees.
    pub fn lattice_parameters(&self) -> ([f64; 3], [f64; 3]) {
        let a: Vector3<f64> = self.h.column(0).into_owned();
        let b: Vector3<f64> = self.h.column(1).into_owned();
        let c: Vector3<f64> = self.h.column(2).into_owned();
        let angle = |u: &Vector3<f64>, v: &Vector3<f64>| {
            (u.dot(v) / (u.norm() * v.norm())).acos().to_degrees()
        };
        (
            [a.norm(), b.norm(), c.norm()],
            [angle(&b, &c), angle(&a, &c), angle(&a, &b)],
        )
    }

    /// Returns the perpendicular widths of the cell (distances between parallel faces).
    /// d_i = 1 / |h_inv.row(i)|
    pub fn perpendicular_widths(&self) -> Vector3<f64> {
        Vector3::new(
            1.0 / self.h_inv.row(0).norm(),
            1.0 / self.h_inv.row(1).norm(),
            1.0 / self.h_inv.row(2).norm(),
        )
    }

    /// Number of periodic images to visit along each axis so that every image
    /// within `radius` of a point inside the cell is reached.
    pub fn image_range(&self, radius: f64) -> Vector3<i32> {
        let widths = self.perpendicular_widths();
        let reach = |periodic: bool, width: f64| {
            if periodic {
                (radius / width).ceil() as i32 + 1
            } else {
                0
            }
        };
        Vector3::new(
            reach(self.pbc.x, widths.x),
            reach(self.pbc.y, widths.y),
            reach(self.pbc.z, widths.z),
        )
    }

    /// Maps fractional coordinates back into `[0, 1)` along periodic axes.
    pub fn wrap_fractional(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        let fold = |periodic: bool, x: f64| if periodic { x - x.floor() } else { x };
        Vector3::new(
            fold(self.pbc.x, frac.x),
            fold(self.pbc.y, frac.y),
            fold(self.pbc.z, frac.z),
        )
    }

    pub fn wrap(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        let frac = self.to_fractional(cart);
        self.to_cartesian(&self.wrap_fractional(&frac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coordinate_transformation() {
        let h = Matrix3::new(4.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0);
        let cell = Cell::new(h, Vector3::new(true, true, true)).unwrap();

        let cart = Vector3::new(2.0, 1.0, 3.0);
        let frac = cell.to_fractional(&cart);
        assert_relative_eq!(frac.x, 0.5);
        assert_relative_eq!(frac.y, 0.25);
        assert_relative_eq!(frac.z, 0.75);

        let back = cell.to_cartesian(&frac);
        assert_relative_eq!(back.x, cart.x);
        assert_relative_eq!(back.y, cart.y);
        assert_relative_eq!(back.z, cart.z);
    }

    #[test]
    fn test_invalid_cell() {
        let cell = Cell::new(Matrix3::zeros(), Vector3::new(true, true, true));
        assert_eq!(cell.unwrap_err(), CellError::NotInvertible);
    }

    #[test]
    fn test_from_parameters_cubic() {
        let cell = Cell::from_parameters([3.0, 3.0, 3.0], [90.0, 90.0, 90.0]).unwrap();
        assert_relative_eq!(cell.volume(), 27.0, epsilon = 1e-10);
        let widths = cell.perpendicular_widths();
        assert_relative_eq!(widths.x, 3.0, epsilon = 1e-10);
        assert_relative_eq!(widths.z, 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_from_parameters_hexagonal_roundtrip() {
        let cell = Cell::from_parameters([2.5, 2.5, 4.0], [90.0, 90.0, 120.0]).unwrap();
        let (lengths, angles) = cell.lattice_parameters();
        assert_relative_eq!(lengths[0], 2.5, epsilon = 1e-10);
        assert_relative_eq!(lengths[1], 2.5, epsilon = 1e-10);
        assert_relative_eq!(lengths[2], 4.0, epsilon = 1e-10);
        assert_relative_eq!(angles[0], 90.0, epsilon = 1e-8);
        assert_relative_eq!(angles[1], 90.0, epsilon = 1e-8);
        assert_relative_eq!(angles[2], 120.0, epsilon = 1e-8);
    }

    #[test]
    fn test_from_parameters_rejects_bad_input() {
        assert!(Cell::from_parameters([0.0, 1.0, 1.0], [90.0, 90.0, 90.0]).is_err());
        assert!(Cell::from_parameters([1.0, 1.0, 1.0], [90.0, 90.0, 0.0]).is_err());
        assert!(Cell::from_parameters([1.0, 1.0, 1.0], [150.0, 150.0, 150.0]).is_err());
    }

    #[test]
    fn test_image_range() {
        let h = Matrix3::identity() * 2.0;
        let cell = Cell::new(h, Vector3::new(true, true, false)).unwrap();
        let range = cell.image_range(3.0);
        assert_eq!(range, Vector3::new(3, 3, 0));
    }

    #[test]
    fn test_mixed_pbc_wrapping() {
        let h = Matrix3::identity() * 10.0;
        let cell = Cell::new(h, Vector3::new(true, false, false)).unwrap();

        let wrapped = cell.wrap(&Vector3::new(15.0, 15.0, -5.0));
        assert_relative_eq!(wrapped.x, 5.0);
        assert_relative_eq!(wrapped.y, 15.0);
        assert_relative_eq!(wrapped.z, -5.0);
    }
}
