//! # Photometry driver
//!
//! Single-pass sibling of [`crate::metadetect::run_metadetect`] for flux
//! work that needs no shear calibration: the same characterization,
//! aggregation and measurement stages run once over the coadd exposures
//! and produce one table instead of a shear-keyed map.
use log::debug;
use rand::Rng;

use crate::configs::MetadetectConfig;
use crate::constants::MultiBandObsList;
use crate::fitting::{fit_original_psfs, get_fitter};
use crate::masks::{add_mfrac, get_mfrac, get_ormask_and_bmask};
use crate::measure::{measure_exposures, MeasurementTable};
use crate::metadetect::{add_original_psf, MetadetectStack};
use crate::metadetect_errors::MetadetectError;
use crate::observation::MultiBandExt;
use crate::shear::{add_noshear_pos, ShearVariant};

/// Run a single detect-and-measure pass over the coadd exposures.
///
/// The stack's metacal engine is never consulted; every observation must
/// carry a `coadd_exp` instead of a generator-attached sheared exposure.
/// Positions reconcile trivially (`row_noshear = row - row0`), and the
/// masked-fraction and PSF-summary columns are attached exactly as in the
/// metadetection pipeline.
///
/// Return
/// ----------
/// * `Ok(Some(table))` – one record per measured object.
/// * `Ok(None)` – the measurement strategy could not produce a usable
///   table.
/// * `Err(_)` – configuration errors or broken preconditions.
pub fn run_photometry(
    mbobs: &mut MultiBandObsList,
    rng: &mut impl Rng,
    config: &MetadetectConfig,
    stack: &MetadetectStack<'_>,
) -> Result<Option<MeasurementTable>, MetadetectError> {
    mbobs.ensure_nonempty()?;
    debug!("running photometry on {} bands", mbobs.nband());

    if config.subtract_sky {
        let sky = stack.sky.ok_or_else(|| {
            MetadetectError::InvalidConfig(
                "subtract_sky is set but no sky subtractor was registered".into(),
            )
        })?;
        sky.subtract_sky(mbobs, config.detect.thresh)?;
    }

    let psf_stats = fit_original_psfs(&config.psf, mbobs, stack.psf_fitter, rng)?;

    let fitter = get_fitter(config);

    // Computed for the caller's benefit; not merged into the table here.
    let (_ormask, _bmask) = get_ormask_and_bmask(mbobs);
    let mfrac = get_mfrac(mbobs);

    let mbexp = mbobs.coadd_exposures()?;
    let mut res = measure_exposures(&mbexp, &stack.measurers, &fitter, config, rng)?;

    if let Some(table) = res.as_mut() {
        let obs = mbobs.first_obs()?;
        // Identity reconciliation; nothing was sheared.
        add_noshear_pos(table, ShearVariant::NoShear, config.metacal.step, &obs.jacobian);
        add_mfrac(table, &mfrac, &obs.jacobian, config.mfrac_fwhm);
        add_original_psf(&psf_stats, table);
    }

    Ok(res)
}
