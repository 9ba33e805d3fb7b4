//! # Pipeline configuration
//!
//! This module defines the configuration structs and their builders, which
//! control how the metadetection pipeline selects measurement strategies,
//! synthesizes shear variants, characterizes PSFs, and tunes detection.
//!
//! ## Purpose
//!
//! [`MetadetectConfig`] centralizes every tunable parameter consumed by
//! [`run_metadetect`](crate::metadetect::run_metadetect). It lets you:
//!
//! - Select the measurement type and deblending strategy (closed
//!   vocabularies, rejected eagerly on unknown values),
//! - Control detection thresholds, stamp sizes, and weight-function widths,
//! - Configure the shear-variant generator (variant set, PSF
//!   symmetrization, noise handling, shear amplitude),
//! - Tune the PSF characterization retries.
//!
//! [`MetadetectAndCalConfig`] is the equivalent for the multi-object-fit
//! pipeline in [`crate::metadetect_and_cal`], where the detection (`sx`),
//! stamp-extraction (`meds`), and group-linking (`fofs`) blocks are
//! mandatory.
//!
//! Every builder validates eagerly: `build()` returns
//! `Err(MetadetectError::InvalidConfig)` on inconsistent values instead of
//! letting them surface deep inside the pipeline.
//!
//! ## Example
//!
//! ```rust
//! use metadetect::configs::{MeasType, MetadetectConfig};
//!
//! let config = MetadetectConfig::builder()
//!     .meas_type(MeasType::Wmom)
//!     .detect_thresh(10.0)
//!     .stamp_size(48)
//!     .weight_fwhm(1.2)
//!     .subtract_sky(true)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.stamp_size, 48);
//! ```
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;
use std::str::FromStr;

use crate::constants::DEFAULT_STEP;
use crate::metadetect_errors::MetadetectError;
use crate::shear::ShearVariant;

/// Measurement type driving fitter selection.
///
/// Unknown strings fail with [`MetadetectError::UnknownMeasType`] at parse
/// time, never inside the measurement loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasType {
    /// Adaptive moments with guessing and retries.
    Am,
    /// Expectation-maximization deblending measures during the deblend.
    Em,
    /// Weighted Gaussian moments.
    Wmom,
    /// K-sigma moments.
    Ksigma,
    /// Pre-PSF Gaussian moments.
    Pgauss,
}

impl MeasType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasType::Am => "am",
            MeasType::Em => "em",
            MeasType::Wmom => "wmom",
            MeasType::Ksigma => "ksigma",
            MeasType::Pgauss => "pgauss",
        }
    }
}

impl fmt::Display for MeasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MeasType {
    type Err = MetadetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "am" => Ok(MeasType::Am),
            "em" => Ok(MeasType::Em),
            "wmom" => Ok(MeasType::Wmom),
            "ksigma" => Ok(MeasType::Ksigma),
            "pgauss" => Ok(MeasType::Pgauss),
            other => Err(MetadetectError::UnknownMeasType(other.to_string())),
        }
    }
}

/// Deblender used when `deblend` is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deblender {
    /// Hierarchical peak-finding deblender producing per-source
    /// sub-footprints.
    Scarlet,
    /// Component-mixture deblender seeded with per-source size estimates.
    Shredder,
}

impl Deblender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Deblender::Scarlet => "scarlet",
            Deblender::Shredder => "shredder",
        }
    }
}

impl fmt::Display for Deblender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Deblender {
    type Err = MetadetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scarlet" => Ok(Deblender::Scarlet),
            "shredder" => Ok(Deblender::Shredder),
            other => Err(MetadetectError::UnknownDeblender(other.to_string())),
        }
    }
}

/// PSF treatment applied by the shear generator before deconvolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetacalPsf {
    /// Round Gaussian reconvolution PSF.
    Gauss,
    /// Gaussian fit to the original PSF, symmetrized.
    Fitgauss,
    /// Dilated rendition of the original PSF.
    Dilate,
}

impl MetacalPsf {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetacalPsf::Gauss => "gauss",
            MetacalPsf::Fitgauss => "fitgauss",
            MetacalPsf::Dilate => "dilate",
        }
    }
}

impl fmt::Display for MetacalPsf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete strategy resolved from `meas_type`/`deblend`/`deblender` at
/// configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureMode {
    /// Peak detection only; objects are measured on blended stamps.
    Blended,
    /// Detect, deblend with the given deblender, measure per sub-footprint.
    Deblended(Deblender),
    /// Single-band expectation-maximization deblend-and-measure.
    Em,
}

impl fmt::Display for MeasureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureMode::Blended => write!(f, "blended"),
            MeasureMode::Deblended(deblender) => write!(f, "deblended/{deblender}"),
            MeasureMode::Em => write!(f, "em"),
        }
    }
}

/// Detection block forwarded to the measurement backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
    /// Detection threshold in units of the sky noise.
    pub thresh: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        DetectConfig { thresh: 5.0 }
    }
}

/// Weight function used by the moments fitters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    /// Weight-function FWHM in arcsec.
    pub fwhm: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        WeightConfig { fwhm: 1.2 }
    }
}

/// PSF characterization block forwarded to the PSF fitter collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsfConfig {
    /// Fit attempts before the fitter reports a bootstrap failure.
    pub ntry: usize,
}

impl Default for PsfConfig {
    fn default() -> Self {
        PsfConfig { ntry: 2 }
    }
}

/// Shear-variant generator block, forwarded to the metacal engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MetacalConfig {
    /// Variants the engine must synthesize.
    pub types: Vec<ShearVariant>,
    /// Reconvolution PSF strategy.
    pub psf: MetacalPsf,
    /// Shear amplitude for the `1p/1m/2p/2m` variants.
    pub step: f64,
    /// Cancel shear-correlated noise with a rotated noise realization.
    pub fixnoise: bool,
    /// Use the observation's attached noise image for `fixnoise`.
    pub use_noise_image: bool,
    /// Symmetrize the PSF before shearing (multi-object-fit path; requires
    /// a `psf` block so the PSFs can be fit first).
    pub symmetrize_psf: bool,
    /// Require the variant set to include `noshear`.
    pub force_required_types: bool,
}

impl Default for MetacalConfig {
    fn default() -> Self {
        MetacalConfig {
            types: ShearVariant::ALL.to_vec(),
            psf: MetacalPsf::Fitgauss,
            step: DEFAULT_STEP,
            fixnoise: true,
            use_noise_image: true,
            symmetrize_psf: false,
            force_required_types: true,
        }
    }
}

impl MetacalConfig {
    /// Copy of this block restricted to a single variant, used for the
    /// per-object passes of the multi-object-fit pipeline.
    pub fn for_single_variant(&self, variant: ShearVariant) -> MetacalConfig {
        let mut config = self.clone();
        config.types = vec![variant];
        config.force_required_types = false;
        config
    }

    fn validate(&self) -> Result<(), MetadetectError> {
        if self.types.is_empty() {
            return Err(MetadetectError::InvalidConfig(
                "metacal types must not be empty".into(),
            ));
        }
        if !(gt0(self.step) && self.step < 1.0) {
            return Err(MetadetectError::InvalidConfig(
                "metacal step must be in (0, 1)".into(),
            ));
        }
        if self.force_required_types && !self.types.contains(&ShearVariant::NoShear) {
            return Err(MetadetectError::InvalidConfig(
                "metacal types must include noshear (or unset force_required_types)".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration parameters controlling
/// [`run_metadetect`](crate::metadetect::run_metadetect).
///
/// Overview
/// -----------------
/// The single-object pipeline proceeds in stages:
///
/// 1) **PSF characterization** – every band/epoch PSF is fit and summarized
///    into one weighted shape/size record.
///
/// 2) **Shear synthesis** – the metacal engine renders the variants listed
///    in `metacal.types`.
///
/// 3) **Detection and measurement** – each variant is independently
///    detected, optionally deblended, and measured with the fitter selected
///    by `meas_type`.
///
/// 4) **Reconciliation** – positions are mapped back to the unsheared
///    frame, masked-pixel fractions sampled, and the PSF summary broadcast
///    into every record.
///
/// Fields
/// -----------------
/// * `meas_type` – fitter selection; `em` switches the whole pipeline to
///   the single-band expectation-maximization strategy.
/// * `subtract_sky` – run the sky-subtraction collaborator first.
/// * `detect` – detection threshold block.
/// * `stamp_size` – postage-stamp side length (pixels) for measurement and
///   masked-fraction sampling.
/// * `weight` – weight-function FWHM (arcsec) for the moments fitters.
/// * `deblend` – measure deblended sub-footprints instead of blended
///   stamps.
/// * `deblender` – which deblender to use when `deblend` is set.
/// * `find_cen` – re-center stamps before measuring (blended strategy
///   only).
/// * `mfrac_fwhm` – aperture FWHM (arcsec) for masked-fraction averages;
///   `None` uses [`crate::constants::DEFAULT_MFRAC_FWHM`].
/// * `metacal` – shear-variant generator block.
/// * `psf` – PSF characterization block.
///
/// Defaults
/// -----------------
/// ```rust
/// use metadetect::configs::MetadetectConfig;
/// let config = MetadetectConfig::default();
/// ```
///
/// Default values:
///
/// * `meas_type`: wmom
/// * `subtract_sky`: false
/// * `detect.thresh`: 5.0
/// * `stamp_size`: 32
/// * `weight.fwhm`: 1.2
/// * `deblend`: false
/// * `deblender`: scarlet
/// * `find_cen`: false
/// * `mfrac_fwhm`: None
/// * `metacal`: all five variants, fitgauss PSF, step 0.01, fixnoise
/// * `psf.ntry`: 2
///
/// See also
/// -----------------
/// * [`run_metadetect`](crate::metadetect::run_metadetect) – consumer of
///   this configuration.
/// * [`MetadetectConfigBuilder`] – fluent construction with validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadetectConfig {
    pub meas_type: MeasType,
    pub subtract_sky: bool,
    pub detect: DetectConfig,
    pub stamp_size: usize,
    pub weight: WeightConfig,
    pub deblend: bool,
    pub deblender: Deblender,
    pub find_cen: bool,
    pub mfrac_fwhm: Option<f64>,
    pub metacal: MetacalConfig,
    pub psf: PsfConfig,
}

impl Default for MetadetectConfig {
    fn default() -> Self {
        MetadetectConfig {
            meas_type: MeasType::Wmom,
            subtract_sky: false,
            detect: DetectConfig::default(),
            stamp_size: 32,
            weight: WeightConfig::default(),
            deblend: false,
            deblender: Deblender::Scarlet,
            find_cen: false,
            mfrac_fwhm: None,
            metacal: MetacalConfig::default(),
            psf: PsfConfig::default(),
        }
    }
}

impl MetadetectConfig {
    /// Construct with default values, equivalent to `default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`MetadetectConfigBuilder`] to override defaults step by
    /// step before validation.
    pub fn builder() -> MetadetectConfigBuilder {
        MetadetectConfigBuilder::new()
    }

    /// Strategy implied by `meas_type`, `deblend` and `deblender`.
    ///
    /// `em` wins over the deblend switch since it performs its own
    /// deblending; otherwise `deblend` selects the configured deblender and
    /// the blended strategy is the fallback.
    pub fn measure_mode(&self) -> MeasureMode {
        if self.meas_type == MeasType::Em {
            MeasureMode::Em
        } else if self.deblend {
            MeasureMode::Deblended(self.deblender)
        } else {
            MeasureMode::Blended
        }
    }
}

/// Builder for [`MetadetectConfig`], with validation.
#[derive(Debug, Clone, Default)]
pub struct MetadetectConfigBuilder {
    config: MetadetectConfig,
}

impl MetadetectConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MetadetectConfig::default(),
        }
    }

    pub fn meas_type(mut self, v: MeasType) -> Self {
        self.config.meas_type = v;
        self
    }
    pub fn subtract_sky(mut self, v: bool) -> Self {
        self.config.subtract_sky = v;
        self
    }
    pub fn detect_thresh(mut self, v: f64) -> Self {
        self.config.detect.thresh = v;
        self
    }
    pub fn stamp_size(mut self, v: usize) -> Self {
        self.config.stamp_size = v;
        self
    }
    pub fn weight_fwhm(mut self, v: f64) -> Self {
        self.config.weight.fwhm = v;
        self
    }
    pub fn deblend(mut self, v: bool) -> Self {
        self.config.deblend = v;
        self
    }
    pub fn deblender(mut self, v: Deblender) -> Self {
        self.config.deblender = v;
        self
    }
    pub fn find_cen(mut self, v: bool) -> Self {
        self.config.find_cen = v;
        self
    }
    pub fn mfrac_fwhm(mut self, v: f64) -> Self {
        self.config.mfrac_fwhm = Some(v);
        self
    }
    pub fn metacal(mut self, v: MetacalConfig) -> Self {
        self.config.metacal = v;
        self
    }
    pub fn psf_ntry(mut self, v: usize) -> Self {
        self.config.psf.ntry = v;
        self
    }

    /// Finalize the builder and produce a [`MetadetectConfig`].
    ///
    /// Validation rules
    /// -----------------
    /// * `detect.thresh > 0`, `weight.fwhm > 0`, `mfrac_fwhm > 0` when set
    ///   (NaN rejected everywhere).
    /// * `stamp_size >= 1`, `psf.ntry >= 1`.
    /// * `metacal.types` non-empty, `0 < metacal.step < 1`, and `noshear`
    ///   present unless `force_required_types` is unset.
    pub fn build(self) -> Result<MetadetectConfig, MetadetectError> {
        let c = &self.config;

        if !gt0(c.detect.thresh) {
            return Err(MetadetectError::InvalidConfig(
                "detect.thresh must be > 0".into(),
            ));
        }
        if !gt0(c.weight.fwhm) {
            return Err(MetadetectError::InvalidConfig(
                "weight.fwhm must be > 0".into(),
            ));
        }
        if let Some(fwhm) = c.mfrac_fwhm {
            if !gt0(fwhm) {
                return Err(MetadetectError::InvalidConfig(
                    "mfrac_fwhm must be > 0".into(),
                ));
            }
        }
        if c.stamp_size == 0 {
            return Err(MetadetectError::InvalidConfig(
                "stamp_size must be >= 1".into(),
            ));
        }
        if c.psf.ntry == 0 {
            return Err(MetadetectError::InvalidConfig(
                "psf.ntry must be >= 1".into(),
            ));
        }
        c.metacal.validate()?;

        Ok(self.config)
    }
}

impl fmt::Display for MetadetectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 42; // width reserved for "name = value"
            writeln!(f, "Metadetection Parameters")?;
            writeln!(f, "------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Measurement]")?;
            line!(
                "meas_type   = {}",
                self.meas_type,
                "Fitter selection"
            )?;
            line!(
                "mode        = {}",
                self.measure_mode(),
                "Resolved strategy"
            )?;
            line!(
                "stamp_size  = {}",
                self.stamp_size,
                "Postage stamp side (pixels)"
            )?;
            line!(
                "weight.fwhm = {:.3}",
                self.weight.fwhm,
                "Moments weight FWHM (arcsec)"
            )?;
            line!("find_cen    = {}", self.find_cen, "Re-center stamps")?;

            writeln!(f, "[Detection]")?;
            line!(
                "thresh       = {:.3}",
                self.detect.thresh,
                "Detection threshold (sigma)"
            )?;
            line!("subtract_sky = {}", self.subtract_sky, "Sky pre-pass")?;

            writeln!(f, "[Metacal]")?;
            let types: Vec<&str> = self.metacal.types.iter().map(|t| t.as_str()).collect();
            line!("types    = {}", types.join(","), "Synthesized variants")?;
            line!("psf      = {}", self.metacal.psf, "Reconvolution PSF")?;
            line!("step     = {:.4}", self.metacal.step, "Shear amplitude")?;
            line!(
                "fixnoise = {}",
                self.metacal.fixnoise,
                "Rotated-noise cancellation"
            )?;

            writeln!(f, "[PSF]")?;
            line!("ntry = {}", self.psf.ntry, "Fit attempts per PSF")
        } else {
            write!(
                f,
                "MetadetectConfig(meas_type={}, mode={}, thresh={}, stamp={})",
                self.meas_type,
                self.measure_mode(),
                self.detect.thresh,
                self.stamp_size
            )
        }
    }
}

/// Source-extraction block of the multi-object-fit pipeline, forwarded to
/// the detection collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SxConfig {
    /// Detection threshold in units of the sky noise.
    pub detect_thresh: f64,
    /// Minimum contrast for splitting blended peaks.
    pub deblend_cont: f64,
    /// Minimum connected area (pixels) for a detection.
    pub minarea: usize,
}

impl Default for SxConfig {
    fn default() -> Self {
        SxConfig {
            detect_thresh: 0.8,
            deblend_cont: 1.0e-5,
            minarea: 4,
        }
    }
}

/// Stamp-extraction block of the multi-object-fit pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedsConfig {
    /// Smallest admissible stamp side (pixels).
    pub min_box_size: usize,
    /// Largest admissible stamp side (pixels).
    pub max_box_size: usize,
    /// Floor on the isolation radius (pixels).
    pub rad_min: f64,
    /// Stamp side as a multiple of the isolation radius.
    pub rad_fac: f64,
    /// Padding added around the derived box (pixels).
    pub box_padding: usize,
}

impl Default for MedsConfig {
    fn default() -> Self {
        MedsConfig {
            min_box_size: 32,
            max_box_size: 256,
            rad_min: 4.0,
            rad_fac: 2.0,
            box_padding: 2,
        }
    }
}

/// Friends-of-friends linking block of the multi-object-fit pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FofConfig {
    /// Tangent-plane linking radius (arcsec); detections closer than this
    /// end up in the same group.
    pub link_radius: f64,
}

impl Default for FofConfig {
    fn default() -> Self {
        FofConfig { link_radius: 1.0 }
    }
}

/// Configuration of the multi-object-fit pipeline
/// ([`crate::metadetect_and_cal`]).
///
/// The `metacal`, `sx` and `meds` blocks are mandatory by construction;
/// `psf` becomes mandatory as soon as `metacal.symmetrize_psf` is set,
/// which `build()` enforces.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadetectAndCalConfig {
    pub metacal: MetacalConfig,
    pub sx: SxConfig,
    pub meds: MedsConfig,
    pub fofs: FofConfig,
    pub psf: Option<PsfConfig>,
    pub weight: WeightConfig,
}

impl Default for MetadetectAndCalConfig {
    fn default() -> Self {
        MetadetectAndCalConfig {
            metacal: MetacalConfig::default(),
            sx: SxConfig::default(),
            meds: MedsConfig::default(),
            fofs: FofConfig::default(),
            psf: None,
            weight: WeightConfig::default(),
        }
    }
}

impl MetadetectAndCalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> MetadetectAndCalConfigBuilder {
        MetadetectAndCalConfigBuilder::new()
    }
}

/// Builder for [`MetadetectAndCalConfig`], with validation.
#[derive(Debug, Clone, Default)]
pub struct MetadetectAndCalConfigBuilder {
    config: MetadetectAndCalConfig,
}

impl MetadetectAndCalConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MetadetectAndCalConfig::default(),
        }
    }

    pub fn metacal(mut self, v: MetacalConfig) -> Self {
        self.config.metacal = v;
        self
    }
    pub fn sx(mut self, v: SxConfig) -> Self {
        self.config.sx = v;
        self
    }
    pub fn meds(mut self, v: MedsConfig) -> Self {
        self.config.meds = v;
        self
    }
    pub fn fofs(mut self, v: FofConfig) -> Self {
        self.config.fofs = v;
        self
    }
    pub fn psf(mut self, v: PsfConfig) -> Self {
        self.config.psf = Some(v);
        self
    }
    pub fn weight_fwhm(mut self, v: f64) -> Self {
        self.config.weight.fwhm = v;
        self
    }

    /// Finalize the builder and produce a [`MetadetectAndCalConfig`].
    ///
    /// Validation rules
    /// -----------------
    /// * metacal block rules (non-empty types, `0 < step < 1`, `noshear`
    ///   presence when forced).
    /// * `sx.detect_thresh > 0`, `sx.deblend_cont >= 0`, `sx.minarea >= 1`.
    /// * `1 <= meds.min_box_size <= meds.max_box_size`,
    ///   `meds.rad_min >= 0`, `meds.rad_fac > 0`.
    /// * `fofs.link_radius > 0`, `weight.fwhm > 0`.
    /// * `psf` present when `metacal.symmetrize_psf` is set.
    pub fn build(self) -> Result<MetadetectAndCalConfig, MetadetectError> {
        let c = &self.config;

        c.metacal.validate()?;
        if c.metacal.symmetrize_psf && c.psf.is_none() {
            return Err(MetadetectError::InvalidConfig(
                "metacal.symmetrize_psf requires a psf block".into(),
            ));
        }
        if !gt0(c.sx.detect_thresh) {
            return Err(MetadetectError::InvalidConfig(
                "sx.detect_thresh must be > 0".into(),
            ));
        }
        if !ge0(c.sx.deblend_cont) {
            return Err(MetadetectError::InvalidConfig(
                "sx.deblend_cont must be >= 0".into(),
            ));
        }
        if c.sx.minarea == 0 {
            return Err(MetadetectError::InvalidConfig(
                "sx.minarea must be >= 1".into(),
            ));
        }
        if c.meds.min_box_size == 0 || c.meds.min_box_size > c.meds.max_box_size {
            return Err(MetadetectError::InvalidConfig(
                "require 1 <= meds.min_box_size <= meds.max_box_size".into(),
            ));
        }
        if !ge0(c.meds.rad_min) || !gt0(c.meds.rad_fac) {
            return Err(MetadetectError::InvalidConfig(
                "meds radii must be non-negative with rad_fac > 0".into(),
            ));
        }
        if !gt0(c.fofs.link_radius) {
            return Err(MetadetectError::InvalidConfig(
                "fofs.link_radius must be > 0".into(),
            ));
        }
        if !gt0(c.weight.fwhm) {
            return Err(MetadetectError::InvalidConfig(
                "weight.fwhm must be > 0".into(),
            ));
        }
        if let Some(psf) = &c.psf {
            if psf.ntry == 0 {
                return Err(MetadetectError::InvalidConfig(
                    "psf.ntry must be >= 1".into(),
                ));
            }
        }

        Ok(self.config)
    }
}

// ---- Numeric helpers for PartialOrd (handle NaN as invalid) ----

/// Return true iff x > 0.0 and comparable (i.e., not NaN).
#[inline]
fn gt0(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Greater)
}

/// Return true iff x >= 0.0 and comparable (i.e., not NaN).
#[inline]
fn ge0(x: f64) -> bool {
    matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
}
