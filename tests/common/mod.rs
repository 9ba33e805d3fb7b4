#![allow(dead_code)]

use ndarray::Array2;
use smallvec::smallvec;

use metadetect::configs::{MetacalConfig, PsfConfig};
use metadetect::constants::{Image, MultiBandObsList, ObsList};
use metadetect::fitting::{Fitter, PsfFitResult, PsfFitter};
use metadetect::measure::{
    Detections, MeasureOpts, MeasurementTable, Measurer, ObjectRecord, Source,
};
use metadetect::metacal::{MetacalEngine, ShearObsMap};
use metadetect::metadetect_errors::MetadetectError;
use metadetect::observation::{
    Exposure, Jacobian, MultibandExposure, Observation, PsfObservation, StackPsf,
};
use metadetect::shear::ShearVariant;
use rand::RngCore;

pub const DIM: usize = 48;
pub const SCALE: f64 = 0.2;

/// Pixel value the stub engine writes into each variant's image, so stubs
/// downstream can tell variants apart.
pub fn variant_marker(variant: ShearVariant) -> f32 {
    match variant {
        ShearVariant::NoShear => 1.0,
        ShearVariant::OneP => 2.0,
        ShearVariant::OneM => 3.0,
        ShearVariant::TwoP => 4.0,
        ShearVariant::TwoM => 5.0,
    }
}

/// One synthetic single-epoch observation with a coadd exposure attached.
pub fn make_obs(weight: f32, mfrac: Option<f32>) -> Observation {
    let cen = DIM as f64 / 2.0;
    let jac = Jacobian::diagonal(SCALE, cen, cen).unwrap();
    let psf = PsfObservation::new(Array2::zeros((24, 24)), jac);
    let coadd = Exposure {
        image: Array2::zeros((DIM, DIM)),
        variance: Array2::from_elem((DIM, DIM), 0.5),
        mask: Array2::zeros((DIM, DIM)),
        row0: 0,
        col0: 0,
        psf: StackPsf::Model,
    };
    let obs = Observation::new(
        Array2::zeros((DIM, DIM)),
        Array2::from_elem((DIM, DIM), weight),
        jac,
        psf,
    )
    .unwrap()
    .with_noise(Array2::zeros((DIM, DIM)))
    .with_coadd_exp(coadd);
    match mfrac {
        Some(value) => obs.with_mfrac(Array2::from_elem((DIM, DIM), value)),
        None => obs,
    }
}

pub fn make_mbobs(nband: usize, mfrac: Option<f32>) -> MultiBandObsList {
    (0..nband)
        .map(|_| smallvec![make_obs(1.0, mfrac)] as ObsList)
        .collect()
}

/// PSF fitter returning the same fixed shape for every observation.
pub struct FixedPsfFitter {
    pub result: PsfFitResult,
}

impl FixedPsfFitter {
    pub fn round(t: f64) -> Self {
        FixedPsfFitter {
            result: PsfFitResult {
                g1: 0.0,
                g2: 0.0,
                t,
            },
        }
    }
}

impl PsfFitter for FixedPsfFitter {
    fn fit_psf(
        &self,
        _obs: &Observation,
        _config: &PsfConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<PsfFitResult, MetadetectError> {
        Ok(self.result)
    }
}

/// PSF fitter that never converges.
pub struct FailingPsfFitter;

impl PsfFitter for FailingPsfFitter {
    fn fit_psf(
        &self,
        _obs: &Observation,
        _config: &PsfConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<PsfFitResult, MetadetectError> {
        Err(MetadetectError::BootPsfFailure("did not converge".into()))
    }
}

/// Engine standing in for the shear synthesis: each requested variant is a
/// copy of the input with its image set to [`variant_marker`].
pub struct MarkerEngine;

impl MetacalEngine for MarkerEngine {
    fn get_all_metacal(
        &self,
        mbobs: &MultiBandObsList,
        config: &MetacalConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<ShearObsMap, MetadetectError> {
        let mut odict = ShearObsMap::default();
        for &variant in &config.types {
            let mut sheared = mbobs.clone();
            for obslist in sheared.iter_mut() {
                for obs in obslist.iter_mut() {
                    obs.image.fill(variant_marker(variant));
                }
            }
            odict.insert(variant, sheared);
        }
        Ok(odict)
    }
}

/// Engine whose PSF bootstrapping always fails.
pub struct UnbootableEngine;

impl MetacalEngine for UnbootableEngine {
    fn get_all_metacal(
        &self,
        _mbobs: &MultiBandObsList,
        _config: &MetacalConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<ShearObsMap, MetadetectError> {
        Err(MetadetectError::BootPsfFailure(
            "fitgauss did not converge".into(),
        ))
    }
}

/// Engine that must never be reached.
pub struct PanickingEngine;

impl MetacalEngine for PanickingEngine {
    fn get_all_metacal(
        &self,
        _mbobs: &MultiBandObsList,
        _config: &MetacalConfig,
        _rng: &mut dyn RngCore,
    ) -> Result<ShearObsMap, MetadetectError> {
        panic!("the engine must not be consulted here");
    }
}

/// Measurement strategy stub: one clean record per canned detection, with
/// the option of failing softly for one marked variant.
pub struct StubMeasurer {
    /// Detection positions in the exposure frame (local pixels).
    pub positions: Vec<(f64, f64)>,
    /// Return `Ok(None)` when the exposure carries this marker value.
    pub fail_marker: Option<f32>,
}

impl StubMeasurer {
    pub fn at(positions: Vec<(f64, f64)>) -> Self {
        StubMeasurer {
            positions,
            fail_marker: None,
        }
    }

    pub fn failing_on(positions: Vec<(f64, f64)>, marker: f32) -> Self {
        StubMeasurer {
            positions,
            fail_marker: Some(marker),
        }
    }
}

impl Measurer for StubMeasurer {
    fn detect_and_deblend(
        &self,
        mbexp: &MultibandExposure<'_>,
        _opts: &MeasureOpts,
        _fitter: &Fitter,
        _rng: &mut dyn RngCore,
    ) -> Result<Detections, MetadetectError> {
        Ok(Detections {
            sources: self
                .positions
                .iter()
                .map(|&(row, col)| Source {
                    row,
                    col,
                    flux: 100.0,
                })
                .collect(),
            detexp: mbexp.band(0).clone(),
            tvals: None,
        })
    }

    fn measure(
        &self,
        mbexp: &MultibandExposure<'_>,
        detections: &Detections,
        _fitter: &Fitter,
        opts: &MeasureOpts,
        _rng: &mut dyn RngCore,
    ) -> Result<Option<MeasurementTable>, MetadetectError> {
        if let Some(marker) = self.fail_marker {
            if mbexp.band(0).image[(0, 0)] == marker {
                return Ok(None);
            }
        }
        let exp = &detections.detexp;
        let table = detections
            .sources
            .iter()
            .map(|src| ObjectRecord {
                flags: 0,
                stamp_size: opts.stamp_size as i32,
                row0: f64::from(exp.row0),
                col0: f64::from(exp.col0),
                row: f64::from(exp.row0) + src.row,
                col: f64::from(exp.col0) + src.col,
                flux: src.flux,
                flux_err: 1.0,
                t: 0.6,
                t_err: 0.05,
                g1: 0.01,
                g2: -0.01,
                s2n: 100.0,
                ..Default::default()
            })
            .collect();
        Ok(Some(table))
    }
}

/// Constant mfrac plane shared by the fixtures.
pub fn uniform_mfrac(value: f32) -> Image {
    Array2::from_elem((DIM, DIM), value)
}
