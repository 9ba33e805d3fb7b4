//! # Constants and shared type aliases
//!
//! This module centralizes the **numeric conventions** and **common type
//! definitions** used throughout the `metadetect` library.
//!
//! ## Overview
//!
//! - Metacalibration shear step and sentinel values
//! - Gaussian FWHM conversion factors
//! - Pixel-map type aliases shared by every module
//! - Container types for storing per-band observations
//!
//! These definitions are used by all main modules, including the shear
//! bookkeeping, mask aggregation, and the orchestrators.

use crate::observation::Observation;
use ndarray::Array2;
use smallvec::SmallVec;

// -------------------------------------------------------------------------------------------------
// Numeric conventions
// -------------------------------------------------------------------------------------------------

/// Shear amplitude applied when synthesizing the `1p/1m/2p/2m` variants
pub const DEFAULT_STEP: f64 = 0.01;

/// Value written into numeric columns of records whose measurement failed
pub const SENTINEL: f64 = -9999.0;

/// Aperture FWHM (arcsec) used for masked-fraction averages when the
/// configuration does not override it
pub const DEFAULT_MFRAC_FWHM: f64 = 1.2;

/// FWHM of a Gaussian divided by its sigma: `2 * sqrt(2 * ln 2)`
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

// -------------------------------------------------------------------------------------------------
// Pixel-map aliases
// -------------------------------------------------------------------------------------------------

/// Floating-point pixel map (image, weight, variance, noise, mfrac planes)
pub type Image = Array2<f32>;

/// Integer bit-mask plane (`ormask`, `bmask`, segmentation maps)
pub type MaskImage = Array2<i32>;

// -------------------------------------------------------------------------------------------------
// Container aliases
// -------------------------------------------------------------------------------------------------

/// Epoch list for one band; the single-epoch pipelines keep exactly one entry
pub type ObsList = SmallVec<[Observation; 1]>;

/// One epoch list per band, ordered by band
pub type MultiBandObsList = Vec<ObsList>;

/// Convert a Gaussian FWHM to its sigma.
#[inline]
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / FWHM_PER_SIGMA
}

/// Convert a Gaussian FWHM to the moments size parameter `T = 2 sigma^2`.
#[inline]
pub fn fwhm_to_t(fwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(fwhm);
    2.0 * sigma * sigma
}
