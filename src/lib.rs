//! # metadetect
//!
//! Shear-calibration measurement pipeline for weak-gravitational-lensing
//! analysis. Given a multi-band set of aligned observations, the library
//! renders several synthetically re-sheared realizations of the same data,
//! independently detects and measures every object in each realization, and
//! assembles the per-object measurements into tables keyed by shear
//! variant, ready for bias-calibrated shear inference downstream.
//!
//! ## Pipelines
//!
//! * [`metadetect::run_metadetect`] – the single-object pipeline: PSF
//!   characterization, mask aggregation, shear synthesis, one independent
//!   detect-deblend-measure pass per variant, and reconciliation of every
//!   record back to the unsheared frame.
//! * [`metadetect_and_cal::MetadetectAndCal`] – the joint-fit sibling:
//!   per-variant re-detection, friends-of-friends grouping, per-object
//!   single-variant metacalibration, and one multi-object fit per group.
//! * [`photometry::run_photometry`] – a single unsheared pass for flux
//!   work.
//!
//! The fitting, deblending, shear-synthesis and sky-subtraction numerics
//! live behind collaborator traits ([`fitting::PsfFitter`],
//! [`measure::Measurer`], [`metacal::MetacalEngine`],
//! [`detect::Medsifier`], [`metadetect::SkySubtractor`]); this crate owns
//! the orchestration, bookkeeping and failure semantics around them.
//!
//! Randomness is threaded explicitly: every stochastic operation takes a
//! caller-supplied RNG, so a fixed seed reproduces a run.

pub mod configs;
pub mod constants;
pub mod detect;
pub mod fitting;
pub mod masks;
pub mod measure;
pub mod metacal;
pub mod metadetect;
pub mod metadetect_and_cal;
pub mod metadetect_errors;
pub mod observation;
pub mod photometry;
pub mod procflags;
pub mod shear;
