//! # Observation data model
//!
//! Containers for the multi-band, single-epoch coadd data the pipeline
//! consumes: one [`Observation`] per band and epoch, grouped into per-band
//! epoch lists and a multi-band set, plus the "stacked exposure" form that
//! detection and deblending backends consume.
//!
//! ## Overview
//!
//! * [`Observation`] – image, weight and mask planes with their
//!   [`Jacobian`] and PSF; optional masked-fraction and noise planes.
//! * [`crate::constants::ObsList`] / [`crate::constants::MultiBandObsList`]
//!   – per-band epoch list and the band set, with [`MultiBandExt`]
//!   providing the validations and exposure accessors used by the
//!   orchestrators.
//! * [`Exposure`] / [`StackPsf`] – externally-representable stacked
//!   exposure; after shear synthesis the PSF is always a
//!   [`StackPsf::FixedKernel`].
//! * [`MultibandExposure`] – ordered, dimension-checked per-band borrow of
//!   exposures handed to detection backends.
//!
//! The pipeline only ever attaches derived fields to observations (the
//! fitted PSF result and the sheared stacked exposure); pixel data is never
//! modified outside the sky-subtraction collaborator.
use ndarray::Array2;

use crate::constants::{Image, MaskImage, MultiBandObsList};
use crate::fitting::PsfFitResult;
use crate::metadetect_errors::MetadetectError;

pub mod jacobian;

pub use jacobian::Jacobian;

/// PSF postage stamp attached to an [`Observation`].
///
/// The `fitted` field starts out `None` and is filled by the PSF
/// characterization pass.
#[derive(Debug, Clone)]
pub struct PsfObservation {
    pub image: Image,
    pub jacobian: Jacobian,
    pub fitted: Option<PsfFitResult>,
}

impl PsfObservation {
    pub fn new(image: Image, jacobian: Jacobian) -> Self {
        PsfObservation {
            image,
            jacobian,
            fitted: None,
        }
    }
}

/// PSF attached to a stacked [`Exposure`].
///
/// A synthetically sheared PSF is no longer expressible through the
/// original model, so the shear generator always attaches a rasterized
/// [`StackPsf::FixedKernel`] built from the sheared PSF image.
#[derive(Debug, Clone, PartialEq)]
pub enum StackPsf {
    /// PSF described by the caller's parametric model.
    Model,
    /// Rasterized kernel image.
    FixedKernel(Image),
}

/// Externally-representable "stacked exposure": the image form detection
/// and deblending backends consume.
///
/// `row0`/`col0` locate the exposure origin in the parent coordinate
/// system; measurement records carry them so positions can be mapped back
/// to local pixel indices.
#[derive(Debug, Clone)]
pub struct Exposure {
    pub image: Image,
    pub variance: Image,
    pub mask: MaskImage,
    pub row0: i32,
    pub col0: i32,
    pub psf: StackPsf,
}

impl Exposure {
    /// Image dimensions as `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        self.image.dim()
    }
}

/// Single-band, single-epoch coadd observation.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Sky-subtracted (or to-be-subtracted) image plane.
    pub image: Image,
    /// Inverse-variance weight plane.
    pub weight: Image,
    /// Pixel / tangent-plane transform at the image center.
    pub jacobian: Jacobian,
    /// PSF stamp evaluated at the jacobian reference point.
    pub psf: PsfObservation,
    /// OR of the per-epoch origin masks.
    pub ormask: MaskImage,
    /// Coadd-level bit mask.
    pub bmask: MaskImage,
    /// Fraction of input epochs masked per pixel, when available.
    pub mfrac: Option<Image>,
    /// Noise realization matching the image, when available.
    pub noise: Option<Image>,
    /// Caller-attached stacked exposure holding the original pixels.
    pub coadd_exp: Option<Box<Exposure>>,
    /// Generator-attached stacked exposure holding the sheared pixels.
    pub exposure: Option<Box<Exposure>>,
}

impl Observation {
    /// Build an observation from its mandatory planes.
    ///
    /// The `ormask` and `bmask` planes start out zeroed; the optional
    /// planes start out absent and can be attached with the `with_*`
    /// builders.
    ///
    /// Return
    /// ----------
    /// * `Err(MetadetectError::MismatchedDimensions)` when the weight plane
    ///   does not match the image shape.
    pub fn new(
        image: Image,
        weight: Image,
        jacobian: Jacobian,
        psf: PsfObservation,
    ) -> Result<Self, MetadetectError> {
        if image.dim() != weight.dim() {
            return Err(MetadetectError::MismatchedDimensions(format!(
                "image {:?} vs weight {:?}",
                image.dim(),
                weight.dim()
            )));
        }
        let dims = image.dim();
        Ok(Observation {
            image,
            weight,
            jacobian,
            psf,
            ormask: Array2::zeros(dims),
            bmask: Array2::zeros(dims),
            mfrac: None,
            noise: None,
            coadd_exp: None,
            exposure: None,
        })
    }

    pub fn with_ormask(mut self, ormask: MaskImage) -> Self {
        self.ormask = ormask;
        self
    }

    pub fn with_bmask(mut self, bmask: MaskImage) -> Self {
        self.bmask = bmask;
        self
    }

    pub fn with_mfrac(mut self, mfrac: Image) -> Self {
        self.mfrac = Some(mfrac);
        self
    }

    pub fn with_noise(mut self, noise: Image) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn with_coadd_exp(mut self, exp: Exposure) -> Self {
        self.coadd_exp = Some(Box::new(exp));
        self
    }

    /// Image dimensions as `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        self.image.dim()
    }
}

/// Ordered per-band borrow of stacked exposures.
///
/// All bands must share the same pixel dimensions; the constructor rejects
/// anything else so backends can index bands interchangeably.
#[derive(Debug)]
pub struct MultibandExposure<'a> {
    bands: Vec<&'a Exposure>,
}

impl<'a> MultibandExposure<'a> {
    pub fn new(bands: Vec<&'a Exposure>) -> Result<Self, MetadetectError> {
        let first = bands.first().ok_or(MetadetectError::EmptyObservationSet)?;
        let dims = first.dims();
        for exp in &bands[1..] {
            if exp.dims() != dims {
                return Err(MetadetectError::MismatchedDimensions(format!(
                    "band exposures {:?} vs {:?}",
                    dims,
                    exp.dims()
                )));
            }
        }
        Ok(MultibandExposure { bands })
    }

    pub fn nband(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> &'a Exposure {
        self.bands[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Exposure> + '_ {
        self.bands.iter().copied()
    }

    /// Shared pixel dimensions as `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        self.bands[0].dims()
    }
}

/// Validation and exposure accessors for
/// [`MultiBandObsList`](crate::constants::MultiBandObsList).
///
/// The single-epoch pipelines only ever look at the first epoch of each
/// band; [`MultiBandExt::ensure_nonempty`] is the cheap entry check the
/// orchestrators run before anything else.
pub trait MultiBandExt {
    /// Number of bands.
    fn nband(&self) -> usize;

    /// Error out when the set is empty or any band has no epochs.
    fn ensure_nonempty(&self) -> Result<(), MetadetectError>;

    /// First epoch of the first band, the reference observation used for
    /// jacobians and map geometry.
    fn first_obs(&self) -> Result<&Observation, MetadetectError>;

    /// Borrow the generator-attached sheared exposures, one per band.
    fn sheared_exposures(&self) -> Result<MultibandExposure<'_>, MetadetectError>;

    /// Borrow the caller-attached coadd exposures, one per band.
    fn coadd_exposures(&self) -> Result<MultibandExposure<'_>, MetadetectError>;
}

impl MultiBandExt for MultiBandObsList {
    fn nband(&self) -> usize {
        self.len()
    }

    fn ensure_nonempty(&self) -> Result<(), MetadetectError> {
        if self.is_empty() || self.iter().any(|obslist| obslist.is_empty()) {
            return Err(MetadetectError::EmptyObservationSet);
        }
        Ok(())
    }

    fn first_obs(&self) -> Result<&Observation, MetadetectError> {
        self.first()
            .and_then(|obslist| obslist.first())
            .ok_or(MetadetectError::EmptyObservationSet)
    }

    fn sheared_exposures(&self) -> Result<MultibandExposure<'_>, MetadetectError> {
        let mut bands = Vec::with_capacity(self.len());
        for obslist in self {
            let obs = obslist.first().ok_or(MetadetectError::EmptyObservationSet)?;
            let exp = obs
                .exposure
                .as_deref()
                .ok_or_else(|| MetadetectError::MissingExposure("sheared".into()))?;
            bands.push(exp);
        }
        MultibandExposure::new(bands)
    }

    fn coadd_exposures(&self) -> Result<MultibandExposure<'_>, MetadetectError> {
        let mut bands = Vec::with_capacity(self.len());
        for obslist in self {
            let obs = obslist.first().ok_or(MetadetectError::EmptyObservationSet)?;
            let exp = obs
                .coadd_exp
                .as_deref()
                .ok_or_else(|| MetadetectError::MissingExposure("coadd".into()))?;
            bands.push(exp);
        }
        MultibandExposure::new(bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ObsList;
    use ndarray::Array2;
    use smallvec::smallvec;

    fn test_obs(dim: usize) -> Observation {
        let jac = Jacobian::diagonal(0.2, dim as f64 / 2.0, dim as f64 / 2.0).unwrap();
        let psf = PsfObservation::new(Array2::zeros((dim, dim)), jac);
        Observation::new(Array2::zeros((dim, dim)), Array2::ones((dim, dim)), jac, psf).unwrap()
    }

    #[test]
    fn mismatched_weight_rejected() {
        let jac = Jacobian::diagonal(0.2, 8.0, 8.0).unwrap();
        let psf = PsfObservation::new(Array2::zeros((16, 16)), jac);
        let err = Observation::new(Array2::zeros((16, 16)), Array2::ones((16, 8)), jac, psf)
            .unwrap_err();
        assert!(matches!(err, MetadetectError::MismatchedDimensions(_)));
    }

    #[test]
    fn nonempty_validation() {
        let mbobs: MultiBandObsList = Vec::new();
        assert_eq!(
            mbobs.ensure_nonempty(),
            Err(MetadetectError::EmptyObservationSet)
        );

        let mbobs: MultiBandObsList = vec![smallvec![test_obs(8)], ObsList::new()];
        assert_eq!(
            mbobs.ensure_nonempty(),
            Err(MetadetectError::EmptyObservationSet)
        );

        let mbobs: MultiBandObsList = vec![smallvec![test_obs(8)]];
        assert!(mbobs.ensure_nonempty().is_ok());
    }

    #[test]
    fn sheared_exposures_require_attachment() {
        let mbobs: MultiBandObsList = vec![smallvec![test_obs(8)]];
        let err = mbobs.sheared_exposures().unwrap_err();
        assert_eq!(err, MetadetectError::MissingExposure("sheared".into()));
    }

    #[test]
    fn multiband_exposure_checks_dimensions() {
        let make_exp = |dim: usize| Exposure {
            image: Array2::zeros((dim, dim)),
            variance: Array2::ones((dim, dim)),
            mask: Array2::zeros((dim, dim)),
            row0: 0,
            col0: 0,
            psf: StackPsf::Model,
        };
        let a = make_exp(16);
        let b = make_exp(8);
        let err = MultibandExposure::new(vec![&a, &b]).unwrap_err();
        assert!(matches!(err, MetadetectError::MismatchedDimensions(_)));

        let b = make_exp(16);
        let mbexp = MultibandExposure::new(vec![&a, &b]).unwrap();
        assert_eq!(mbexp.nband(), 2);
        assert_eq!(mbexp.dims(), (16, 16));
    }
}
