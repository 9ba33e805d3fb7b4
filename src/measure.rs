//! # Detect-deblend-measure dispatch
//!
//! One shear variant at a time, this module routes an observation set to
//! the measurement strategy the configuration implies: blended stamps,
//! deblended stamps through one of two deblenders, or single-band
//! expectation-maximization. The strategies are external collaborators
//! behind the [`Measurer`] trait; the dispatcher only selects, marshals
//! parameters, and enforces the per-mode preconditions. It performs no
//! measurement logic itself.
//!
//! The per-object output format ([`ObjectRecord`]) also lives here since
//! every strategy produces it.
use log::info;
use rand::{Rng, RngCore};

use crate::configs::{Deblender, MeasureMode, MetadetectConfig};
use crate::constants::{MultiBandObsList, SENTINEL};
use crate::fitting::Fitter;
use crate::metadetect_errors::MetadetectError;
use crate::observation::{Exposure, MultiBandExt, MultibandExposure};
use crate::procflags;

/// One measured object.
///
/// Numeric fields default to the sentinel and `flags` to
/// [`procflags::NO_ATTEMPT`]; a strategy that measures an object clears
/// the flag and fills the fields, so an untouched record is recognizably
/// unmeasured. The `*_noshear` positions, `mfrac` and `psfrec_*` columns
/// are attached by the orchestrator after measurement; `sx_row`/`sx_col`
/// are only filled by the multi-object-fit pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// OR of the failure flags hit while measuring this object.
    pub flags: u32,
    /// Stamp side used for the measurement (pixels).
    pub stamp_size: i32,
    /// Origin of the measured exposure in the parent coordinate system.
    pub row0: f64,
    pub col0: f64,
    /// Detection position in the sheared frame (parent pixels).
    pub row: f64,
    pub col: f64,
    /// Position mapped back to the unsheared frame (local pixels).
    pub row_noshear: f64,
    pub col_noshear: f64,
    /// Detection-frame position, pre shear correction (multi-object fit).
    pub sx_row: f64,
    pub sx_col: f64,
    pub flux: f64,
    pub flux_err: f64,
    /// Size parameter `T = <x^2> + <y^2>` in arcsec^2.
    pub t: f64,
    pub t_err: f64,
    pub g1: f64,
    pub g2: f64,
    /// Signal to noise of the flux measurement.
    pub s2n: f64,
    /// Masked fraction sampled at the unsheared position.
    pub mfrac: f64,
    /// PSF summary broadcast from the unsheared data.
    pub psfrec_flags: u32,
    pub psfrec_g1: f64,
    pub psfrec_g2: f64,
    pub psfrec_t: f64,
}

impl Default for ObjectRecord {
    fn default() -> Self {
        ObjectRecord {
            flags: procflags::NO_ATTEMPT,
            stamp_size: -9999,
            row0: SENTINEL,
            col0: SENTINEL,
            row: SENTINEL,
            col: SENTINEL,
            row_noshear: SENTINEL,
            col_noshear: SENTINEL,
            sx_row: SENTINEL,
            sx_col: SENTINEL,
            flux: SENTINEL,
            flux_err: SENTINEL,
            t: SENTINEL,
            t_err: SENTINEL,
            g1: SENTINEL,
            g2: SENTINEL,
            s2n: SENTINEL,
            mfrac: SENTINEL,
            psfrec_flags: procflags::NO_ATTEMPT,
            psfrec_g1: SENTINEL,
            psfrec_g2: SENTINEL,
            psfrec_t: SENTINEL,
        }
    }
}

/// Per-variant measurement output, one record per detected object.
pub type MeasurementTable = Vec<ObjectRecord>;

/// Table of `n` unmeasured records, ready for a strategy to fill.
pub fn new_measurement_table(n: usize) -> MeasurementTable {
    vec![ObjectRecord::default(); n]
}

/// One detection produced by a strategy's detect-and-deblend step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Source {
    /// Position in the detection exposure (parent pixels).
    pub row: f64,
    pub col: f64,
    pub flux: f64,
}

/// Output of [`Measurer::detect_and_deblend`], consumed by
/// [`Measurer::measure`].
#[derive(Debug, Clone)]
pub struct Detections {
    pub sources: Vec<Source>,
    /// Exposure the detection ran on, carrying the footprints.
    pub detexp: Exposure,
    /// Per-source size estimates, only produced by the component-mixture
    /// deblender which feeds them into measurement as priors.
    pub tvals: Option<Vec<f64>>,
}

/// Scalar options marshaled from the configuration to the strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureOpts {
    /// Detection threshold in units of the sky noise.
    pub thresh: f64,
    /// Postage stamp side length (pixels).
    pub stamp_size: usize,
    /// Re-centroid stamps instead of trusting the detection position
    /// (blended strategy; needs the RNG for tie-breaks).
    pub find_cen: bool,
}

/// Externally supplied measurement strategy.
///
/// Every strategy exposes the same two-step surface. Detection failures
/// are errors; a measurement pass that runs but produces nothing usable
/// reports `Ok(None)`, which the orchestrator records as a failed variant
/// rather than a failed run.
pub trait Measurer {
    fn detect_and_deblend(
        &self,
        mbexp: &MultibandExposure<'_>,
        opts: &MeasureOpts,
        fitter: &Fitter,
        rng: &mut dyn RngCore,
    ) -> Result<Detections, MetadetectError>;

    fn measure(
        &self,
        mbexp: &MultibandExposure<'_>,
        detections: &Detections,
        fitter: &Fitter,
        opts: &MeasureOpts,
        rng: &mut dyn RngCore,
    ) -> Result<Option<MeasurementTable>, MetadetectError>;
}

/// Registry of the measurement strategies the caller provides.
///
/// Only the strategy the configuration selects has to be present;
/// [`MeasurerSet::select`] rejects a configured-but-unregistered strategy
/// before any pixel work starts.
#[derive(Default, Clone, Copy)]
pub struct MeasurerSet<'a> {
    pub blended: Option<&'a dyn Measurer>,
    pub scarlet: Option<&'a dyn Measurer>,
    pub shredder: Option<&'a dyn Measurer>,
    pub em: Option<&'a dyn Measurer>,
}

impl<'a> MeasurerSet<'a> {
    pub fn select(&self, mode: MeasureMode) -> Result<&'a dyn Measurer, MetadetectError> {
        let (slot, name) = match mode {
            MeasureMode::Blended => (self.blended, "blended"),
            MeasureMode::Deblended(Deblender::Scarlet) => (self.scarlet, "scarlet"),
            MeasureMode::Deblended(Deblender::Shredder) => (self.shredder, "shredder"),
            MeasureMode::Em => (self.em, "em"),
        };
        slot.ok_or_else(|| MetadetectError::MissingMeasurer(name.into()))
    }
}

/// Run detection, deblending and measurement on one sheared observation
/// set.
///
/// The strategy comes from [`MetadetectConfig::measure_mode`]; its
/// generator-attached exposures are handed to the selected [`Measurer`].
///
/// Return
/// ----------
/// * `Ok(Some(table))` – one record per measured object.
/// * `Ok(None)` – the strategy ran but could not produce a usable table;
///   the variant is recorded as failed.
/// * `Err(_)` – configuration or precondition failures (no exposures
///   attached, `em` with more than one band or with an object fitter,
///   unregistered strategy).
///
/// # Panics
///
/// The blended strategy panics when a band has more than one epoch.
pub fn detect_deblend_and_measure(
    mbobs: &MultiBandObsList,
    measurers: &MeasurerSet<'_>,
    fitter: &Fitter,
    config: &MetadetectConfig,
    rng: &mut impl Rng,
) -> Result<Option<MeasurementTable>, MetadetectError> {
    let mbexp = mbobs.sheared_exposures()?;

    if config.measure_mode() == MeasureMode::Blended {
        for obslist in mbobs {
            assert_eq!(obslist.len(), 1, "no multiepoch");
        }
    }

    measure_exposures(&mbexp, measurers, fitter, config, rng)
}

/// Strategy dispatch over pre-built exposures.
///
/// [`detect_deblend_and_measure`] routes the sheared exposures here; the
/// photometry driver routes the coadd exposures instead.
pub fn measure_exposures(
    mbexp: &MultibandExposure<'_>,
    measurers: &MeasurerSet<'_>,
    fitter: &Fitter,
    config: &MetadetectConfig,
    rng: &mut impl Rng,
) -> Result<Option<MeasurementTable>, MetadetectError> {
    let opts = MeasureOpts {
        thresh: config.detect.thresh,
        stamp_size: config.stamp_size,
        find_cen: config.find_cen,
    };

    let mode = config.measure_mode();
    let measurer = measurers.select(mode)?;

    match mode {
        MeasureMode::Blended => {
            info!("measuring with blended stamps");
        }
        MeasureMode::Deblended(Deblender::Scarlet) => {
            info!("measuring with deblended stamps");
        }
        MeasureMode::Deblended(Deblender::Shredder) => {
            info!("measuring with the Shredder");
        }
        MeasureMode::Em => {
            if mbexp.nband() != 1 {
                return Err(MetadetectError::InvalidConfig(format!(
                    "em needs exactly one band, got {}",
                    mbexp.nband()
                )));
            }
            if !fitter.is_none() {
                return Err(MetadetectError::InvalidConfig(
                    "no fitter may be configured for em".into(),
                ));
            }
            info!("measuring with em");
        }
    }

    let detections = measurer.detect_and_deblend(mbexp, &opts, fitter, rng)?;
    measurer.measure(mbexp, &detections, fitter, &opts, rng)
}
