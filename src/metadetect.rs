//! # Metadetection orchestrator
//!
//! Top-level driver of the single-object pipeline: sky subtraction, PSF
//! characterization, mask and masked-fraction aggregation, shear
//! realization generation, then one independent detect-deblend-measure
//! pass per variant, with every surviving table reconciled back to the
//! unsheared frame.
//!
//! ## Failure tiers
//!
//! * PSF characterization failures are absorbed into a flagged
//!   [`PsfStats`] and the run continues.
//! * A shear-generation failure makes the whole result `Ok(None)`; no
//!   partial results are produced.
//! * A per-variant measurement failure makes that variant's entry `None`
//!   and the remaining variants still run.
//! * Everything else (configuration errors, broken preconditions) is an
//!   `Err` crossing the orchestrator boundary.
//!
//! ## Example
//!
//! ```rust,ignore
//! let stack = MetadetectStack {
//!     sky: None,
//!     psf_fitter: &my_psf_fitter,
//!     engine: &my_metacal_engine,
//!     measurers: MeasurerSet { blended: Some(&my_measurer), ..Default::default() },
//! };
//! let result = run_metadetect(&mut mbobs, &mut rng, &config, &stack)?;
//! ```
use std::collections::HashMap;

use log::debug;
use rand::Rng;

use crate::configs::MetadetectConfig;
use crate::constants::MultiBandObsList;
use crate::fitting::{fit_original_psfs, get_fitter, PsfFitter, PsfStats};
use crate::masks::{add_mfrac, get_mfrac, get_ormask_and_bmask};
use crate::measure::{detect_deblend_and_measure, MeasurementTable, MeasurerSet, ObjectRecord};
use crate::metacal::{get_all_metacal, MetacalEngine};
use crate::metadetect_errors::MetadetectError;
use crate::observation::MultiBandExt;
use crate::shear::{add_noshear_pos, ShearVariant};

/// Measurement tables keyed by shear variant.
///
/// A `None` entry means that variant was generated but its measurement
/// failed; a variant the generator never produced has no key at all. The
/// distinction between "no result" and "flagged result" lives inside the
/// tables, never in missing keys.
pub type ShearResultMap =
    HashMap<ShearVariant, Option<MeasurementTable>, ahash::RandomState>;

/// Borrow one variant's entry from a result map.
pub fn variant_result(
    map: &ShearResultMap,
    variant: ShearVariant,
) -> Option<&Option<MeasurementTable>> {
    map.get(&variant)
}

/// Remove and return one variant's entry from a result map.
pub fn take_variant_result(
    map: &mut ShearResultMap,
    variant: ShearVariant,
) -> Option<Option<MeasurementTable>> {
    map.remove(&variant)
}

/// Sky-background subtraction collaborator; mutates the images in place.
pub trait SkySubtractor {
    fn subtract_sky(
        &self,
        mbobs: &mut MultiBandObsList,
        thresh: f64,
    ) -> Result<(), MetadetectError>;
}

/// Collaborator bundle handed to [`run_metadetect`].
///
/// `sky` is only consulted when the configuration asks for sky
/// subtraction; the other collaborators are always required.
pub struct MetadetectStack<'a> {
    pub sky: Option<&'a dyn SkySubtractor>,
    pub psf_fitter: &'a dyn PsfFitter,
    pub engine: &'a dyn MetacalEngine,
    pub measurers: MeasurerSet<'a>,
}

/// Run metadetection on a multi-band observation set.
///
/// Bright-object masking must be applied before calling this; the set is
/// mutated in place by sky subtraction and by the PSF fits attached
/// during characterization.
///
/// Arguments
/// -----------------
/// * `mbobs` – one single-epoch observation per band, each carrying a
///   `coadd_exp` so the sheared exposures can be materialized.
/// * `rng` – caller-owned randomness threaded through every stochastic
///   collaborator.
/// * `config` – validated pipeline configuration.
/// * `stack` – collaborator bundle.
///
/// Return
/// ----------
/// * `Ok(Some(map))` – one entry per generated variant; `None` entries
///   are variants whose measurement failed.
/// * `Ok(None)` – shear realization generation failed; nothing is
///   measurable for this input.
/// * `Err(_)` – configuration errors or broken preconditions.
///
/// See also
/// ------------
/// * [`detect_deblend_and_measure`] – the per-variant strategy dispatch.
/// * [`crate::metadetect_and_cal`] – the joint-fit sibling driver.
pub fn run_metadetect(
    mbobs: &mut MultiBandObsList,
    rng: &mut impl Rng,
    config: &MetadetectConfig,
    stack: &MetadetectStack<'_>,
) -> Result<Option<ShearResultMap>, MetadetectError> {
    mbobs.ensure_nonempty()?;
    debug!("running metadetect on {} bands", mbobs.nband());

    if config.subtract_sky {
        let sky = stack.sky.ok_or_else(|| {
            MetadetectError::InvalidConfig(
                "subtract_sky is set but no sky subtractor was registered".into(),
            )
        })?;
        sky.subtract_sky(mbobs, config.detect.thresh)?;
    }

    // One summary for the whole set; broadcast to every record later.
    let psf_stats = fit_original_psfs(&config.psf, mbobs, stack.psf_fitter, rng)?;

    let fitter = get_fitter(config);

    // Computed for the caller's benefit; not merged into the tables here.
    let (_ormask, _bmask) = get_ormask_and_bmask(mbobs);
    let mfrac = get_mfrac(mbobs);

    let odict = match get_all_metacal(stack.engine, &config.metacal, mbobs, rng)? {
        Some(odict) => odict,
        None => return Ok(None),
    };

    let mut result = ShearResultMap::default();
    // Canonical variant order keeps RNG consumption reproducible.
    for variant in ShearVariant::ALL {
        let sheared_mbobs = match odict.get(&variant) {
            Some(sheared_mbobs) => sheared_mbobs,
            None => continue,
        };

        let mut res = detect_deblend_and_measure(
            sheared_mbobs,
            &stack.measurers,
            &fitter,
            config,
            rng,
        )?;

        if let Some(table) = res.as_mut() {
            let obs = sheared_mbobs.first_obs()?;
            add_noshear_pos(table, variant, config.metacal.step, &obs.jacobian);
            add_mfrac(table, &mfrac, &obs.jacobian, config.mfrac_fwhm);
            add_original_psf(&psf_stats, table);
        }

        result.insert(variant, res);
    }

    Ok(Some(result))
}

/// Copy the PSF summary verbatim into every record's `psfrec_*` columns.
///
/// The same summary goes to all objects and all variants; PSF
/// characterization is not re-derived per object.
pub fn add_original_psf(psf_stats: &PsfStats, table: &mut [ObjectRecord]) {
    for rec in table.iter_mut() {
        rec.psfrec_flags = psf_stats.flags;
        rec.psfrec_g1 = psf_stats.g1;
        rec.psfrec_g2 = psf_stats.g2;
        rec.psfrec_t = psf_stats.t;
    }
}
