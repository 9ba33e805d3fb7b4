//! # Shear variants and position reconciliation
//!
//! The metacalibration scheme measures every object on five synthetically
//! sheared renditions of the same data: an unsheared control (`noshear`)
//! and four single-component shears of amplitude [`DEFAULT_STEP`]
//! (`1p/1m/2p/2m`). Detections made on a sheared rendition live in that
//! rendition's pixel frame; [`unshear_positions`] maps them back to the
//! unsheared frame through the observation jacobian so that rows of
//! different variants can be compared and matched.
//!
//! Shearing acts on tangent-plane coordinates with the reduced-shear
//! distortion matrix
//!
//! ```text
//! A(g1, g2) = 1 / sqrt(1 - g1^2 - g2^2) * [ 1 + g1   g2     ]
//!                                         [ g2       1 - g1 ]
//! ```
//!
//! whose inverse is exactly `A(-g1, -g2)` (the determinant is one), so the
//! reverse mapping never needs a numeric inversion.
use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix2, Vector2};

use crate::constants::DEFAULT_STEP;
use crate::measure::ObjectRecord;
use crate::metadetect_errors::MetadetectError;
use crate::observation::Jacobian;

/// Label of one synthetic shear rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShearVariant {
    /// Unsheared control rendition.
    NoShear,
    /// `+step` on the first shear component.
    OneP,
    /// `-step` on the first shear component.
    OneM,
    /// `+step` on the second shear component.
    TwoP,
    /// `-step` on the second shear component.
    TwoM,
}

impl ShearVariant {
    /// All variants in canonical processing order.
    ///
    /// Orchestrators iterate this order so that RNG consumption is
    /// reproducible for a fixed seed.
    pub const ALL: [ShearVariant; 5] = [
        ShearVariant::NoShear,
        ShearVariant::OneP,
        ShearVariant::OneM,
        ShearVariant::TwoP,
        ShearVariant::TwoM,
    ];

    /// Canonical string label (`noshear`, `1p`, `1m`, `2p`, `2m`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ShearVariant::NoShear => "noshear",
            ShearVariant::OneP => "1p",
            ShearVariant::OneM => "1m",
            ShearVariant::TwoP => "2p",
            ShearVariant::TwoM => "2m",
        }
    }

    /// Reduced shear `(g1, g2)` applied by this variant at amplitude `step`.
    pub fn shear(&self, step: f64) -> (f64, f64) {
        match self {
            ShearVariant::NoShear => (0.0, 0.0),
            ShearVariant::OneP => (step, 0.0),
            ShearVariant::OneM => (-step, 0.0),
            ShearVariant::TwoP => (0.0, step),
            ShearVariant::TwoM => (0.0, -step),
        }
    }
}

impl fmt::Display for ShearVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShearVariant {
    type Err = MetadetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noshear" => Ok(ShearVariant::NoShear),
            "1p" => Ok(ShearVariant::OneP),
            "1m" => Ok(ShearVariant::OneM),
            "2p" => Ok(ShearVariant::TwoP),
            "2m" => Ok(ShearVariant::TwoM),
            other => Err(MetadetectError::UnknownShearVariant(other.to_string())),
        }
    }
}

/// Reduced-shear distortion matrix acting on `(u, v)` tangent-plane
/// coordinates.
///
/// Requires `g1^2 + g2^2 < 1`; the configured metacal step keeps the
/// amplitude far below that bound.
pub fn shear_matrix(g1: f64, g2: f64) -> Matrix2<f64> {
    debug_assert!(g1 * g1 + g2 * g2 < 1.0);
    let fac = 1.0 / (1.0 - g1 * g1 - g2 * g2).sqrt();
    Matrix2::new(fac * (1.0 + g1), fac * g2, fac * g2, fac * (1.0 - g1))
}

/// Map positions measured in a sheared rendition back to the unsheared
/// frame.
///
/// `rows`/`cols` and the jacobian reference point share the same local
/// pixel frame (positions relative to the exposure origin). Each position
/// is moved to the tangent plane, multiplied by the inverse distortion
/// matrix, and moved back.
///
/// The zero-shear variant short-circuits to the identity, so `noshear`
/// positions survive the round trip bit-exactly.
pub fn unshear_positions(
    rows: &[f64],
    cols: &[f64],
    variant: ShearVariant,
    step: f64,
    jacobian: &Jacobian,
) -> (Vec<f64>, Vec<f64>) {
    let (g1, g2) = variant.shear(step);
    if g1 == 0.0 && g2 == 0.0 {
        return (rows.to_vec(), cols.to_vec());
    }

    // A(g)^-1 == A(-g), see module docs.
    let ainv = shear_matrix(-g1, -g2);

    let mut urows = Vec::with_capacity(rows.len());
    let mut ucols = Vec::with_capacity(cols.len());
    for (&row, &col) in rows.iter().zip(cols) {
        let (v, u) = jacobian.get_vu(row, col);
        let upos = ainv * Vector2::new(u, v);
        let (urow, ucol) = jacobian.get_rowcol(upos[1], upos[0]);
        urows.push(urow);
        ucols.push(ucol);
    }
    (urows, ucols)
}

/// Fill the `row_noshear`/`col_noshear` columns of a measurement table.
///
/// Positions enter as `row - row0` / `col - col0` (local pixel frame) and
/// leave reconciled to the unsheared frame of `jacobian`.
pub fn add_noshear_pos(
    table: &mut [ObjectRecord],
    variant: ShearVariant,
    step: f64,
    jacobian: &Jacobian,
) {
    let rows: Vec<f64> = table.iter().map(|rec| rec.row - rec.row0).collect();
    let cols: Vec<f64> = table.iter().map(|rec| rec.col - rec.col0).collect();
    let (urows, ucols) = unshear_positions(&rows, &cols, variant, step, jacobian);
    for ((rec, urow), ucol) in table.iter_mut().zip(urows).zip(ucols) {
        rec.row_noshear = urow;
        rec.col_noshear = ucol;
    }
}

/// Convenience wrapper using the standard shear amplitude.
pub fn unshear_positions_default(
    rows: &[f64],
    cols: &[f64],
    variant: ShearVariant,
    jacobian: &Jacobian,
) -> (Vec<f64>, Vec<f64>) {
    unshear_positions(rows, cols, variant, DEFAULT_STEP, jacobian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn labels_roundtrip() {
        for variant in ShearVariant::ALL {
            let parsed: ShearVariant = variant.as_str().parse().unwrap();
            assert_eq!(parsed, variant);
        }
        let err = "3p".parse::<ShearVariant>().unwrap_err();
        assert_eq!(err, MetadetectError::UnknownShearVariant("3p".into()));
    }

    #[test]
    fn shear_components() {
        assert_eq!(ShearVariant::NoShear.shear(0.01), (0.0, 0.0));
        assert_eq!(ShearVariant::OneP.shear(0.01), (0.01, 0.0));
        assert_eq!(ShearVariant::OneM.shear(0.01), (-0.01, 0.0));
        assert_eq!(ShearVariant::TwoP.shear(0.01), (0.0, 0.01));
        assert_eq!(ShearVariant::TwoM.shear(0.01), (0.0, -0.01));
    }

    #[test]
    fn shear_matrix_has_unit_determinant() {
        let a = shear_matrix(0.01, 0.0);
        assert_relative_eq!(a.determinant(), 1.0, epsilon = 1e-14);
        let a = shear_matrix(0.03, -0.07);
        assert_relative_eq!(a.determinant(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn opposite_shear_is_the_inverse() {
        let a = shear_matrix(0.01, 0.0);
        let b = shear_matrix(-0.01, 0.0);
        let prod = a * b;
        assert_relative_eq!(prod[(0, 0)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(prod[(1, 1)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(prod[(0, 1)], 0.0, epsilon = 1e-14);
        assert_relative_eq!(prod[(1, 0)], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn noshear_positions_are_bit_exact() {
        let jac = Jacobian::new(24.0, 24.0, 0.21, 0.013, -0.008, 0.19).unwrap();
        let rows = [3.7, 11.2, 40.9];
        let cols = [5.1, 30.6, 2.2];
        let (urows, ucols) =
            unshear_positions(&rows, &cols, ShearVariant::NoShear, DEFAULT_STEP, &jac);
        assert_eq!(urows, rows);
        assert_eq!(ucols, cols);
    }

    #[test]
    fn unshearing_undoes_shearing() {
        let jac = Jacobian::diagonal(0.2, 24.0, 24.0).unwrap();
        let variant = ShearVariant::TwoP;
        let (g1, g2) = variant.shear(DEFAULT_STEP);
        let a = shear_matrix(g1, g2);

        // Shear a position forward by hand, then ask the reverse mapping
        // for the original.
        let (row, col) = (30.25, 14.5);
        let (v, u) = jac.get_vu(row, col);
        let sheared = a * Vector2::new(u, v);
        let (srow, scol) = jac.get_rowcol(sheared[1], sheared[0]);

        let (urows, ucols) = unshear_positions(&[srow], &[scol], variant, DEFAULT_STEP, &jac);
        assert_relative_eq!(urows[0], row, epsilon = 1e-10);
        assert_relative_eq!(ucols[0], col, epsilon = 1e-10);
    }

    #[test]
    fn first_component_shear_moves_positions_along_its_axes() {
        let jac = Jacobian::diagonal(0.2, 24.0, 24.0).unwrap();

        // Displacement purely along v (rows): A(-g1) rescales v by
        // fac * (1 + g1) > 1, so the unsheared row moves outward.
        let (urows, ucols) =
            unshear_positions(&[40.0], &[24.0], ShearVariant::OneP, DEFAULT_STEP, &jac);
        assert!(urows[0] > 40.0);
        assert_relative_eq!(ucols[0], 24.0, epsilon = 1e-12);

        // Displacement purely along u (cols): rescaled by
        // sqrt((1 - g1) / (1 + g1)) < 1, so the column moves inward.
        let (urows, ucols) =
            unshear_positions(&[24.0], &[40.0], ShearVariant::OneP, DEFAULT_STEP, &jac);
        assert_relative_eq!(urows[0], 24.0, epsilon = 1e-12);
        assert!(ucols[0] < 40.0);
    }
}
