//! # Fitters and PSF characterization
//!
//! Two concerns live here. First, the resolution of the configured
//! measurement type into a [`Fitter`] capability handle that measurement
//! backends interpret; the vocabulary is closed and unknown names are
//! rejected when the configuration is parsed, never inside the measurement
//! loop. Second, the PSF characterization pass: every band/epoch PSF is
//! fit through the caller-supplied [`PsfFitter`] and summarized into one
//! weighted [`PsfStats`] record with an explicit failure fallback.
//!
//! The crate owns no fitting numerics. Concrete moment fitters, the PSF
//! fitter, and the joint multi-object fitter are external collaborators
//! reached through the traits defined here.
use log::warn;
use rand::{Rng, RngCore};

use crate::configs::{MeasType, MetadetectConfig, PsfConfig, WeightConfig};
use crate::constants::{MultiBandObsList, SENTINEL};
use crate::detect::FofGroup;
use crate::measure::MeasurementTable;
use crate::metadetect_errors::MetadetectError;
use crate::observation::Observation;
use crate::procflags;

/// Fit attempts used by the adaptive-moments object fitter.
pub const ADMOM_NTRY: usize = 2;

/// Shape/size produced by one PSF fit, attached to the observation's PSF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsfFitResult {
    pub g1: f64,
    pub g2: f64,
    /// Size parameter `T = <x^2> + <y^2>` in arcsec^2.
    pub t: f64,
}

/// Weighted summary of every PSF fit in an observation set.
///
/// Built once per pipeline run and broadcast verbatim into the
/// `psfrec_*` columns of every output record. Immutable after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsfStats {
    pub flags: u32,
    pub g1: f64,
    pub g2: f64,
    pub t: f64,
}

impl PsfStats {
    /// Summary standing in when PSF characterization failed: the failure
    /// flag plus sentinel values.
    pub fn failed() -> Self {
        PsfStats {
            flags: procflags::PSF_FAILURE,
            g1: SENTINEL,
            g2: SENTINEL,
            t: SENTINEL,
        }
    }
}

/// Externally supplied PSF fitting routine.
///
/// Implementations fit the PSF model at the observation's jacobian
/// reference point. A fit that cannot converge reports
/// [`MetadetectError::BootPsfFailure`]; any other error is treated as
/// fatal by the callers.
pub trait PsfFitter {
    fn fit_psf(
        &self,
        obs: &Observation,
        config: &PsfConfig,
        rng: &mut dyn RngCore,
    ) -> Result<PsfFitResult, MetadetectError>;
}

/// Externally supplied joint fitter for friends-of-friends groups.
///
/// `fit` receives one observation list per **catalog entry**; `groups`
/// holds member indices into that list. Implementations return one record
/// per group member in flattened group-member order (groups in order,
/// members in each group's order) — the callers match records back to
/// catalog entries through that order.
pub trait MultiObjectFitter {
    fn fit(
        &self,
        groups: &[FofGroup],
        mbobs_list: &[MultiBandObsList],
        weight: &WeightConfig,
        rng: &mut dyn RngCore,
    ) -> Result<MeasurementTable, MetadetectError>;
}

/// Capability handle interpreted by the measurement backends.
///
/// Selection happens once, from the validated configuration; the RNG is
/// supplied at measurement time instead of being captured here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fitter {
    /// Adaptive moments with a moments-based guesser and retries.
    Admom { ntry: usize },
    /// Weighted Gaussian moments with the given aperture FWHM (arcsec).
    Wmom { fwhm: f64 },
    /// K-sigma moments with the given aperture FWHM (arcsec).
    Ksigma { fwhm: f64 },
    /// Pre-PSF Gaussian moments with the given aperture FWHM (arcsec).
    Pgauss { fwhm: f64 },
    /// No object fitter: the EM strategy measures while deblending.
    None,
}

impl Fitter {
    pub fn is_none(&self) -> bool {
        matches!(self, Fitter::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Fitter::Admom { .. } => "am",
            Fitter::Wmom { .. } => "wmom",
            Fitter::Ksigma { .. } => "ksigma",
            Fitter::Pgauss { .. } => "pgauss",
            Fitter::None => "none",
        }
    }
}

/// Resolve the configured measurement type into a [`Fitter`] handle.
///
/// The moments fitters take their aperture from `weight.fwhm`; the
/// adaptive-moments fitter retries [`ADMOM_NTRY`] times; `em` needs no
/// object fitter at all. Unknown measurement types cannot reach this
/// point: they are rejected when parsing [`MeasType`].
pub fn get_fitter(config: &MetadetectConfig) -> Fitter {
    match config.meas_type {
        MeasType::Am => Fitter::Admom { ntry: ADMOM_NTRY },
        MeasType::Em => Fitter::None,
        MeasType::Wmom => Fitter::Wmom {
            fwhm: config.weight.fwhm,
        },
        MeasType::Ksigma => Fitter::Ksigma {
            fwhm: config.weight.fwhm,
        },
        MeasType::Pgauss => Fitter::Pgauss {
            fwhm: config.weight.fwhm,
        },
    }
}

/// Fit the PSF of every band and epoch, attaching results to the
/// observations.
///
/// Fail-fast: the first fit error aborts the loop and propagates, leaving
/// earlier attachments in place.
pub fn fit_all_psfs(
    mbobs: &mut MultiBandObsList,
    psf_config: &PsfConfig,
    fitter: &dyn PsfFitter,
    rng: &mut impl Rng,
) -> Result<(), MetadetectError> {
    for obslist in mbobs.iter_mut() {
        for obs in obslist.iter_mut() {
            let fitted = fitter.fit_psf(obs, psf_config, rng)?;
            obs.psf.fitted = Some(fitted);
        }
    }
    Ok(())
}

/// Characterize the original (pre-shear) PSFs of an observation set.
///
/// Every band/epoch PSF is fit, then combined into weighted means using
/// the maximum of each observation's weight map as the weight. A total
/// weight of zero is a bootstrap failure.
///
/// Failure handling
/// -----------------
/// * [`MetadetectError::BootPsfFailure`] (from the fitter or the total
///   weight check) is absorbed: the returned summary carries
///   [`procflags::PSF_FAILURE`] and sentinel values, and the pipeline
///   continues.
/// * Any other error propagates.
pub fn fit_original_psfs(
    psf_config: &PsfConfig,
    mbobs: &mut MultiBandObsList,
    fitter: &dyn PsfFitter,
    rng: &mut impl Rng,
) -> Result<PsfStats, MetadetectError> {
    match try_fit_original_psfs(psf_config, mbobs, fitter, rng) {
        Ok(stats) => Ok(stats),
        Err(MetadetectError::BootPsfFailure(reason)) => {
            warn!("PSF characterization failed ({reason}); records will carry PSF_FAILURE");
            Ok(PsfStats::failed())
        }
        Err(other) => Err(other),
    }
}

fn try_fit_original_psfs(
    psf_config: &PsfConfig,
    mbobs: &mut MultiBandObsList,
    fitter: &dyn PsfFitter,
    rng: &mut impl Rng,
) -> Result<PsfStats, MetadetectError> {
    fit_all_psfs(mbobs, psf_config, fitter, rng)?;

    let mut g1sum = 0.0;
    let mut g2sum = 0.0;
    let mut tsum = 0.0;
    let mut wsum = 0.0;

    for obslist in mbobs.iter() {
        for obs in obslist.iter() {
            let wt = obs.weight.iter().fold(0.0f32, |acc, &w| acc.max(w)) as f64;
            let fitted = obs.psf.fitted.as_ref().ok_or_else(|| {
                MetadetectError::BootPsfFailure("missing psf fit result".into())
            })?;
            g1sum += fitted.g1 * wt;
            g2sum += fitted.g2 * wt;
            tsum += fitted.t * wt;
            wsum += wt;
        }
    }

    if wsum <= 0.0 {
        return Err(MetadetectError::BootPsfFailure(
            "zero weights, could not get mean psf properties".into(),
        ));
    }

    Ok(PsfStats {
        flags: 0,
        g1: g1sum / wsum,
        g2: g2sum / wsum,
        t: tsum / wsum,
    })
}
