//! # Pixel / tangent-plane transform
//!
//! Affine mapping between pixel coordinates `(row, col)` and local
//! tangent-plane sky coordinates `(v, u)` in arcsec, anchored at a
//! reference pixel. Every observation carries one of these; the shear
//! bookkeeping uses it to move detection positions between the sheared and
//! unsheared frames.
use nalgebra::{Matrix2, Vector2};

use crate::metadetect_errors::MetadetectError;

/// First-order WCS linearized at the reference pixel `(row0, col0)`.
///
/// The derivative matrix maps pixel offsets to tangent-plane offsets:
///
/// ```text
/// (v, u) = [ dvdrow  dvdcol ] (row - row0)
///          [ dudrow  dudcol ] (col - col0)
/// ```
///
/// Construction rejects non-finite or singular derivative matrices, so the
/// inverse mapping is always defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jacobian {
    pub row0: f64,
    pub col0: f64,
    pub dvdrow: f64,
    pub dvdcol: f64,
    pub dudrow: f64,
    pub dudcol: f64,
}

impl Jacobian {
    /// Build a jacobian from its reference pixel and derivative entries.
    ///
    /// Return
    /// ----------
    /// * `Err(MetadetectError::DegenerateJacobian)` when any entry is not
    ///   finite or the derivative matrix is singular.
    pub fn new(
        row0: f64,
        col0: f64,
        dvdrow: f64,
        dvdcol: f64,
        dudrow: f64,
        dudcol: f64,
    ) -> Result<Self, MetadetectError> {
        let jac = Jacobian {
            row0,
            col0,
            dvdrow,
            dvdcol,
            dudrow,
            dudcol,
        };
        let det = jac.det();
        if !det.is_finite() || det == 0.0 {
            return Err(MetadetectError::DegenerateJacobian(format!(
                "determinant = {det}"
            )));
        }
        Ok(jac)
    }

    /// Diagonal jacobian with a uniform pixel scale in arcsec per pixel.
    pub fn diagonal(scale: f64, row0: f64, col0: f64) -> Result<Self, MetadetectError> {
        Self::new(row0, col0, scale, 0.0, 0.0, scale)
    }

    /// Determinant of the derivative matrix.
    #[inline]
    pub fn det(&self) -> f64 {
        self.dvdrow * self.dudcol - self.dvdcol * self.dudrow
    }

    /// Linear pixel scale `sqrt(|det|)` in arcsec per pixel.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.det().abs().sqrt()
    }

    /// Derivative matrix as a 2x2, rows ordered `(v, u)`.
    #[inline]
    pub fn matrix(&self) -> Matrix2<f64> {
        Matrix2::new(self.dvdrow, self.dvdcol, self.dudrow, self.dudcol)
    }

    /// Tangent-plane coordinates `(v, u)` of the pixel position `(row, col)`.
    pub fn get_vu(&self, row: f64, col: f64) -> (f64, f64) {
        let vu = self.matrix() * Vector2::new(row - self.row0, col - self.col0);
        (vu[0], vu[1])
    }

    /// Pixel position `(row, col)` of the tangent-plane point `(v, u)`.
    pub fn get_rowcol(&self, v: f64, u: f64) -> (f64, f64) {
        // Explicit 2x2 inverse; construction guarantees det != 0.
        let det = self.det();
        let drow = (self.dudcol * v - self.dvdcol * u) / det;
        let dcol = (-self.dudrow * v + self.dvdrow * u) / det;
        (self.row0 + drow, self.col0 + dcol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn diagonal_scale() {
        let jac = Jacobian::diagonal(0.2, 15.5, 15.5).unwrap();
        assert_relative_eq!(jac.scale(), 0.2, epsilon = 1e-15);
    }

    #[test]
    fn vu_rowcol_roundtrip() {
        let jac = Jacobian::new(24.0, 26.0, 0.21, 0.01, -0.015, 0.2).unwrap();
        let (v, u) = jac.get_vu(31.25, 18.75);
        let (row, col) = jac.get_rowcol(v, u);
        assert_relative_eq!(row, 31.25, epsilon = 1e-10);
        assert_relative_eq!(col, 18.75, epsilon = 1e-10);
    }

    #[test]
    fn reference_pixel_maps_to_origin() {
        let jac = Jacobian::diagonal(0.263, 10.0, 12.0).unwrap();
        let (v, u) = jac.get_vu(10.0, 12.0);
        assert_eq!(v, 0.0);
        assert_eq!(u, 0.0);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let err = Jacobian::new(0.0, 0.0, 0.2, 0.2, 0.2, 0.2).unwrap_err();
        assert!(matches!(err, MetadetectError::DegenerateJacobian(_)));

        let err = Jacobian::new(0.0, 0.0, f64::NAN, 0.0, 0.0, 0.2).unwrap_err();
        assert!(matches!(err, MetadetectError::DegenerateJacobian(_)));
    }
}
