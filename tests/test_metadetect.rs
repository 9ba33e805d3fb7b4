mod common;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use metadetect::configs::MetadetectConfig;
use metadetect::constants::SENTINEL;
use metadetect::measure::MeasurerSet;
use metadetect::metadetect::{run_metadetect, MetadetectStack, SkySubtractor};
use metadetect::metadetect_errors::MetadetectError;
use metadetect::procflags;
use metadetect::shear::ShearVariant;

use crate::common::{
    make_mbobs, variant_marker, FailingPsfFitter, FixedPsfFitter, MarkerEngine, StubMeasurer,
    UnbootableEngine,
};

#[test]
fn full_pipeline_keys_every_variant() {
    let mut mbobs = make_mbobs(3, Some(0.3));
    let mut rng = StdRng::seed_from_u64(42);

    let psf_fitter = FixedPsfFitter::round(0.8);
    let measurer = StubMeasurer::at(vec![(10.25, 12.5), (30.0, 31.5)]);
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &psf_fitter,
        engine: &MarkerEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };
    let config = MetadetectConfig::default();

    let result = run_metadetect(&mut mbobs, &mut rng, &config, &stack)
        .unwrap()
        .unwrap();

    assert_eq!(result.len(), 5);
    for variant in ShearVariant::ALL {
        let table = result[&variant].as_ref().unwrap();
        assert_eq!(table.len(), 2);
        for rec in table {
            assert_eq!(rec.flags, 0);
            assert_eq!(rec.stamp_size, 32);
            // PSF summary broadcast verbatim into every record.
            assert_eq!(rec.psfrec_flags, 0);
            assert_relative_eq!(rec.psfrec_g1, 0.0, epsilon = 1e-12);
            assert_relative_eq!(rec.psfrec_t, 0.8, epsilon = 1e-12);
            // Uniform 0.3 mfrac plane, weighted average of a constant.
            assert_relative_eq!(rec.mfrac, 0.3, epsilon = 1e-5);
        }
    }
}

#[test]
fn noshear_positions_reconcile_to_the_identity() {
    let mut mbobs = make_mbobs(1, None);
    let mut rng = StdRng::seed_from_u64(7);

    let psf_fitter = FixedPsfFitter::round(0.8);
    let measurer = StubMeasurer::at(vec![(10.25, 12.5)]);
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &psf_fitter,
        engine: &MarkerEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };
    let config = MetadetectConfig::default();

    let result = run_metadetect(&mut mbobs, &mut rng, &config, &stack)
        .unwrap()
        .unwrap();

    let table = result[&ShearVariant::NoShear].as_ref().unwrap();
    let rec = &table[0];
    // Exact: the zero-shear variant short-circuits to the identity.
    assert_eq!(rec.row_noshear, rec.row - rec.row0);
    assert_eq!(rec.col_noshear, rec.col - rec.col0);

    // A sheared variant moves the reconciled position, but only slightly.
    let table = result[&ShearVariant::OneP].as_ref().unwrap();
    let rec = &table[0];
    assert_ne!(rec.row_noshear, rec.row - rec.row0);
    assert_relative_eq!(rec.row_noshear, rec.row - rec.row0, epsilon = 0.5);
}

#[test]
fn shear_generation_failure_nulls_the_whole_result() {
    let mut mbobs = make_mbobs(2, Some(0.1));
    let mut rng = StdRng::seed_from_u64(42);

    let psf_fitter = FixedPsfFitter::round(0.8);
    let measurer = StubMeasurer::at(vec![(10.0, 10.0)]);
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &psf_fitter,
        engine: &UnbootableEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };

    let result =
        run_metadetect(&mut mbobs, &mut rng, &MetadetectConfig::default(), &stack).unwrap();
    assert!(result.is_none());
}

#[test]
fn one_failed_variant_leaves_the_others_alone() {
    let mut mbobs = make_mbobs(2, None);
    let mut rng = StdRng::seed_from_u64(42);

    let psf_fitter = FixedPsfFitter::round(0.8);
    let measurer = StubMeasurer::failing_on(
        vec![(10.0, 10.0)],
        variant_marker(ShearVariant::TwoM),
    );
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &psf_fitter,
        engine: &MarkerEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };

    let result = run_metadetect(&mut mbobs, &mut rng, &MetadetectConfig::default(), &stack)
        .unwrap()
        .unwrap();

    assert_eq!(result.len(), 5);
    assert!(result[&ShearVariant::TwoM].is_none());
    for variant in [
        ShearVariant::NoShear,
        ShearVariant::OneP,
        ShearVariant::OneM,
        ShearVariant::TwoP,
    ] {
        assert!(result[&variant].is_some(), "{variant} should have survived");
    }
}

#[test]
fn psf_characterization_failure_is_flagged_not_fatal() {
    let mut mbobs = make_mbobs(2, None);
    let mut rng = StdRng::seed_from_u64(42);

    let measurer = StubMeasurer::at(vec![(10.0, 10.0)]);
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &FailingPsfFitter,
        engine: &MarkerEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };

    let result = run_metadetect(&mut mbobs, &mut rng, &MetadetectConfig::default(), &stack)
        .unwrap()
        .unwrap();

    for variant in ShearVariant::ALL {
        let table = result[&variant].as_ref().unwrap();
        for rec in table {
            // Object measurement succeeded; only the PSF columns degrade.
            assert_eq!(rec.flags, 0);
            assert_eq!(rec.psfrec_flags, procflags::PSF_FAILURE);
            assert_eq!(rec.psfrec_g1, SENTINEL);
            assert_eq!(rec.psfrec_t, SENTINEL);
        }
    }
}

#[test]
fn sky_subtraction_is_gated_by_config() {
    struct OffsetSky;
    impl SkySubtractor for OffsetSky {
        fn subtract_sky(
            &self,
            mbobs: &mut metadetect::constants::MultiBandObsList,
            _thresh: f64,
        ) -> Result<(), MetadetectError> {
            for obslist in mbobs.iter_mut() {
                for obs in obslist.iter_mut() {
                    obs.image -= 1.5;
                }
            }
            Ok(())
        }
    }

    let psf_fitter = FixedPsfFitter::round(0.8);
    let measurer = StubMeasurer::at(vec![(10.0, 10.0)]);
    let config = MetadetectConfig::builder()
        .subtract_sky(true)
        .build()
        .unwrap();

    // Requested but not registered: configuration error.
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &psf_fitter,
        engine: &MarkerEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };
    let mut mbobs = make_mbobs(1, None);
    let mut rng = StdRng::seed_from_u64(42);
    let err = run_metadetect(&mut mbobs, &mut rng, &config, &stack).unwrap_err();
    assert!(matches!(err, MetadetectError::InvalidConfig(_)));

    // Registered: the pre-pass mutates the input images in place.
    let sky = OffsetSky;
    let stack = MetadetectStack {
        sky: Some(&sky),
        ..stack
    };
    let mut mbobs = make_mbobs(1, None);
    let mut rng = StdRng::seed_from_u64(42);
    run_metadetect(&mut mbobs, &mut rng, &config, &stack)
        .unwrap()
        .unwrap();
    assert!(mbobs[0][0].image.iter().all(|&v| v == -1.5));
}

#[test]
fn empty_observation_sets_are_rejected() {
    let psf_fitter = FixedPsfFitter::round(0.8);
    let measurer = StubMeasurer::at(vec![]);
    let stack = MetadetectStack {
        sky: None,
        psf_fitter: &psf_fitter,
        engine: &MarkerEngine,
        measurers: MeasurerSet {
            blended: Some(&measurer),
            ..Default::default()
        },
    };
    let mut mbobs = Vec::new();
    let mut rng = StdRng::seed_from_u64(42);
    let err =
        run_metadetect(&mut mbobs, &mut rng, &MetadetectConfig::default(), &stack).unwrap_err();
    assert_eq!(err, MetadetectError::EmptyObservationSet);
}
