//! # Shear realization generation
//!
//! The synthetic-shear image construction itself lives behind the
//! [`MetacalEngine`] collaborator trait; this module owns the crate-side
//! bookkeeping around it: absorbing the named PSF-bootstrap failure into a
//! "no result" outcome, and materializing the stacked exposures that
//! detection and deblending consume downstream.
use std::collections::HashMap;

use log::warn;
use rand::{Rng, RngCore};

use crate::configs::MetacalConfig;
use crate::constants::MultiBandObsList;
use crate::metadetect_errors::MetadetectError;
use crate::observation::StackPsf;
use crate::shear::ShearVariant;

/// Sheared observation sets keyed by variant, as produced by the engine.
pub type ShearObsMap = HashMap<ShearVariant, MultiBandObsList, ahash::RandomState>;

/// Externally supplied metacalibration routine.
///
/// Produces one re-sheared copy of the observation set per variant in
/// `config.types`, with noise statistics corrected per the configuration.
/// Band order and epoch counts must match the input set. PSF
/// reconstruction failures are reported as
/// [`MetadetectError::BootPsfFailure`].
pub trait MetacalEngine {
    fn get_all_metacal(
        &self,
        mbobs: &MultiBandObsList,
        config: &MetacalConfig,
        rng: &mut dyn RngCore,
    ) -> Result<ShearObsMap, MetadetectError>;
}

/// Produce all sheared realizations and attach their stacked exposures.
///
/// `Ok(None)` means the engine failed PSF bootstrapping, reachable when
/// the reconvolution PSF is a model fit such as `fitgauss`; the caller
/// must treat the whole input as unmeasurable. Any other engine error is
/// fatal and propagates.
///
/// On success every sheared observation gets an `exposure` attachment: a
/// deep copy of the original observation's `coadd_exp` with its pixels
/// overwritten by the sheared image, its variance plane doubled, and its
/// PSF replaced by a fixed kernel rasterized from the sheared PSF image
/// (the sheared PSF is no longer expressible through the original model).
pub fn get_all_metacal(
    engine: &dyn MetacalEngine,
    config: &MetacalConfig,
    mbobs: &MultiBandObsList,
    rng: &mut impl Rng,
) -> Result<Option<ShearObsMap>, MetadetectError> {
    let mut odict = match engine.get_all_metacal(mbobs, config, rng) {
        Ok(odict) => odict,
        Err(MetadetectError::BootPsfFailure(reason)) => {
            warn!("shear realization generation failed: {reason}");
            return Ok(None);
        }
        Err(other) => return Err(other),
    };

    for sheared_mbobs in odict.values_mut() {
        attach_stack_exposures(sheared_mbobs, mbobs)?;
    }

    Ok(Some(odict))
}

/// Materialize the externally-representable exposure on every sheared
/// observation, band by band and epoch by epoch.
fn attach_stack_exposures(
    sheared_mbobs: &mut MultiBandObsList,
    orig_mbobs: &MultiBandObsList,
) -> Result<(), MetadetectError> {
    for (obslist, orig_obslist) in sheared_mbobs.iter_mut().zip(orig_mbobs) {
        for (obs, orig_obs) in obslist.iter_mut().zip(orig_obslist) {
            let mut exp = orig_obs
                .coadd_exp
                .as_deref()
                .cloned()
                .ok_or_else(|| MetadetectError::MissingExposure("coadd".into()))?;

            exp.image.assign(&obs.image);
            // The fixnoise correction run before shearing halves the
            // effective noise.
            exp.variance *= 2.0;
            exp.psf = StackPsf::FixedKernel(obs.psf.image.clone());

            obs.exposure = Some(Box::new(exp));
        }
    }
    Ok(())
}
