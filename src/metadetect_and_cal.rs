//! # Multi-object-fit orchestrator
//!
//! Sibling driver of [`crate::metadetect`] for the case where objects must
//! be fit jointly. Instead of one detect-and-measure pass per variant, each
//! variant is re-detected through the [`Medsifier`] backend to obtain a
//! segmentation, the detections are linked into friends-of-friends groups,
//! every object receives its own single-variant metacalibration pass, and
//! one joint fit runs per group.
//!
//! Detection runs on the sheared pixels while the per-object observation
//! sets are cut from the original pixels under the sheared segmentation.
//! The output tables carry detection-frame positions (`sx_row`/`sx_col`);
//! reconciliation to the unsheared frame is left to the caller.
//!
//! Unlike the single-object pipeline, a shear-generation failure here is an
//! `Err`, not an absorbed "no result": the caller of this driver owns the
//! decision to skip the input.
use log::{debug, info};
use rand::Rng;

use crate::configs::MetadetectAndCalConfig;
use crate::constants::MultiBandObsList;
use crate::detect::{FofGroup, Medsifier, SxCatalog};
use crate::fitting::{fit_all_psfs, MultiObjectFitter, PsfFitter};
use crate::measure::MeasurementTable;
use crate::metacal::MetacalEngine;
use crate::metadetect::ShearResultMap;
use crate::metadetect_errors::MetadetectError;
use crate::observation::MultiBandExt;
use crate::shear::ShearVariant;

/// Collaborator bundle of the multi-object-fit pipeline.
///
/// `psf_fitter` is only consulted for the PSF-symmetrization pre-step and
/// may be absent otherwise; [`MetadetectAndCal::new`] rejects a
/// configuration that asks for symmetrization without one.
pub struct MofStack<'a> {
    pub psf_fitter: Option<&'a dyn PsfFitter>,
    pub engine: &'a dyn MetacalEngine,
    pub medsifier: &'a dyn Medsifier,
    pub fitter: &'a dyn MultiObjectFitter,
}

/// Validated driver state: an immutable configuration plus the collaborator
/// bundle. Run results are returned from [`MetadetectAndCal::go`], never
/// stored here.
pub struct MetadetectAndCal<'a> {
    config: MetadetectAndCalConfig,
    stack: MofStack<'a>,
}

impl<'a> MetadetectAndCal<'a> {
    /// Validate the configuration against the collaborator bundle.
    ///
    /// The configuration is expected to come out of its builder already
    /// validated; this adds the cross-check that PSF symmetrization has a
    /// PSF fitter to lean on.
    pub fn new(
        config: MetadetectAndCalConfig,
        stack: MofStack<'a>,
    ) -> Result<Self, MetadetectError> {
        if config.metacal.symmetrize_psf && stack.psf_fitter.is_none() {
            return Err(MetadetectError::InvalidConfig(
                "metacal.symmetrize_psf requires a psf fitter".into(),
            ));
        }
        Ok(MetadetectAndCal { config, stack })
    }

    pub fn config(&self) -> &MetadetectAndCalConfig {
        &self.config
    }

    /// Run the joint-fit pipeline on a multi-band observation set.
    ///
    /// Return
    /// ----------
    /// * `Ok(map)` – one entry per generated variant; a variant with zero
    ///   detections maps to `None`.
    /// * `Err(_)` – configuration errors, broken preconditions, or a shear
    ///   generation failure (including `BootPsfFailure`, which this path
    ///   propagates instead of absorbing).
    pub fn go(
        &self,
        mbobs: &mut MultiBandObsList,
        rng: &mut impl Rng,
    ) -> Result<ShearResultMap, MetadetectError> {
        mbobs.ensure_nonempty()?;
        debug!("running metadetect-and-cal on {} bands", mbobs.nband());

        if self.config.metacal.symmetrize_psf {
            // Symmetrization needs fitted PSFs; both the psf block and the
            // fitter presence were checked at construction time.
            let psf_config = self.config.psf.as_ref().ok_or_else(|| {
                MetadetectError::InvalidConfig(
                    "metacal.symmetrize_psf requires a psf block".into(),
                )
            })?;
            let psf_fitter = self.stack.psf_fitter.ok_or_else(|| {
                MetadetectError::InvalidConfig(
                    "metacal.symmetrize_psf requires a psf fitter".into(),
                )
            })?;
            fit_all_psfs(mbobs, psf_config, psf_fitter, rng)?;
        }

        let odict = self
            .stack
            .engine
            .get_all_metacal(mbobs, &self.config.metacal, rng)?;

        let mut result = ShearResultMap::default();
        // Canonical variant order keeps RNG consumption reproducible.
        for variant in ShearVariant::ALL {
            let sheared_mbobs = match odict.get(&variant) {
                Some(sheared_mbobs) => sheared_mbobs,
                None => continue,
            };
            let res = self.process_variant(variant, sheared_mbobs, mbobs, rng)?;
            result.insert(variant, res);
        }

        Ok(result)
    }

    /// Detect, group, metacal per object, and jointly fit one variant.
    fn process_variant(
        &self,
        variant: ShearVariant,
        sheared_mbobs: &MultiBandObsList,
        orig_mbobs: &MultiBandObsList,
        rng: &mut impl Rng,
    ) -> Result<Option<MeasurementTable>, MetadetectError> {
        let catalog =
            self.stack
                .medsifier
                .medsify(sheared_mbobs, &self.config.sx, &self.config.meds)?;
        if catalog.is_empty() {
            info!("{variant}: no detections");
            return Ok(None);
        }
        debug!("{variant}: {} detections", catalog.len());

        // Stamps are cut from the original pixels under the sheared
        // segmentation.
        let mbobs_list =
            self.stack
                .medsifier
                .mbobs_list(orig_mbobs, &catalog, &self.config.meds)?;
        let groups = self.stack.medsifier.fof_groups(&catalog, &self.config.fofs)?;

        let metacaled = self.metacal_mbobs_list(variant, &mbobs_list, rng)?;

        let mut table =
            self.stack
                .fitter
                .fit(&groups, &metacaled, &self.config.weight, rng)?;
        add_sx_positions(&mut table, &catalog, &groups);

        Ok(Some(table))
    }

    /// Apply a single-variant metacal pass to every per-object observation
    /// set.
    ///
    /// The group-level calibration differs from the top-level one: only the
    /// current variant is rendered and the required-types rule is waived.
    fn metacal_mbobs_list(
        &self,
        variant: ShearVariant,
        mbobs_list: &[MultiBandObsList],
        rng: &mut impl Rng,
    ) -> Result<Vec<MultiBandObsList>, MetadetectError> {
        let single = self.config.metacal.for_single_variant(variant);
        let mut out = Vec::with_capacity(mbobs_list.len());
        for obj_mbobs in mbobs_list {
            let mut odict = self.stack.engine.get_all_metacal(obj_mbobs, &single, rng)?;
            let sheared = odict
                .remove(&variant)
                .ok_or_else(|| MetadetectError::MissingVariant(variant.to_string()))?;
            out.push(sheared);
        }
        Ok(out)
    }
}

/// Attach detection-frame positions to the joint-fit output.
///
/// The fitter returns records in group-member order; catalog positions are
/// matched through the group structure. Positions are pre shear
/// correction, SEP axis convention (`x` is the column).
fn add_sx_positions(table: &mut MeasurementTable, catalog: &SxCatalog, groups: &[FofGroup]) {
    let order: Vec<usize> = groups
        .iter()
        .flat_map(|group| group.members.iter().copied())
        .collect();
    for (rec, &idx) in table.iter_mut().zip(&order) {
        rec.sx_row = catalog.objects[idx].y;
        rec.sx_col = catalog.objects[idx].x;
    }
}

/// One-shot convenience wrapper around [`MetadetectAndCal`].
pub fn do_metadetect_and_cal(
    config: MetadetectAndCalConfig,
    mbobs: &mut MultiBandObsList,
    rng: &mut impl Rng,
    stack: MofStack<'_>,
) -> Result<ShearResultMap, MetadetectError> {
    MetadetectAndCal::new(config, stack)?.go(mbobs, rng)
}
