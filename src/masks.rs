//! # Mask and quality aggregation
//!
//! Reductions of the per-band mask planes into single shared planes: the
//! bitwise OR of the origin and coadd masks, and the weighted mean of the
//! masked-fraction (`mfrac`) maps. Aggregation always happens in the
//! unsheared frame, before any shear variant is rendered, so every variant
//! shares the same quality maps.
//!
//! [`measure_mfrac`] samples the aggregated map at object positions with a
//! Gaussian aperture; the orchestrators call it through [`add_mfrac`] after
//! positions have been reconciled to the unsheared frame.
use itertools::izip;
use ndarray::Array2;

use crate::constants::{
    fwhm_to_sigma, Image, MaskImage, MultiBandObsList, DEFAULT_MFRAC_FWHM,
};
use crate::measure::ObjectRecord;
use crate::observation::Jacobian;

/// OR-combine the per-band `ormask`/`bmask` planes.
///
/// A single band passes its masks through unchanged. The operation is
/// idempotent: combining the same band set again yields the same planes.
///
/// # Panics
///
/// Panics unless every band has exactly one epoch; the combined masks are
/// only meaningful for the single-epoch pipelines.
pub fn get_ormask_and_bmask(mbobs: &MultiBandObsList) -> (MaskImage, MaskImage) {
    assert!(!mbobs.is_empty(), "mask aggregation needs at least one band");
    for obslist in mbobs {
        assert_eq!(
            obslist.len(),
            1,
            "ormask/bmask building only works for one epoch per band"
        );
    }

    let dims = mbobs[0][0].dims();
    let mut ormask: MaskImage = Array2::zeros(dims);
    let mut bmask: MaskImage = Array2::zeros(dims);
    for obslist in mbobs {
        let obs = &obslist[0];
        ormask |= &obs.ormask;
        bmask |= &obs.bmask;
    }
    (ormask, bmask)
}

/// Weighted mean of the per-band masked-fraction maps.
///
/// Each band contributes with the median of its weight map; bands without
/// an `mfrac` plane contribute zero (but their weight still enters the
/// normalization). The division is not guarded: an observation set whose
/// weights are all zero produces NaN pixels, which downstream sampling
/// treats as unusable data rather than masking the problem here.
///
/// # Panics
///
/// Panics unless every band has exactly one epoch, like
/// [`get_ormask_and_bmask`].
pub fn get_mfrac(mbobs: &MultiBandObsList) -> Image {
    assert!(!mbobs.is_empty(), "mfrac aggregation needs at least one band");

    let dims = mbobs[0][0].dims();
    let mut mfrac: Image = Array2::zeros(dims);
    let mut wsum = 0.0f32;
    for obslist in mbobs {
        assert_eq!(
            obslist.len(),
            1,
            "mfrac aggregation only works for one epoch per band"
        );
        let obs = &obslist[0];
        let wgt = median(&obs.weight);
        if let Some(band_mfrac) = &obs.mfrac {
            mfrac.scaled_add(wgt, band_mfrac);
        }
        wsum += wgt;
    }
    mfrac /= wsum;
    mfrac
}

/// Gaussian-weighted average of a masked-fraction map around each
/// position.
///
/// Arguments
/// -----------------
/// * `mfrac` – aggregated map, unsheared frame.
/// * `rows`, `cols` – local pixel positions in the same frame as the map.
/// * `box_sizes` – per-position box side (pixels); the box is clipped to
///   the map.
/// * `jacobian` – converts the aperture FWHM from arcsec to pixels.
/// * `fwhm` – aperture FWHM in arcsec; `None` uses
///   [`DEFAULT_MFRAC_FWHM`].
///
/// Return
/// ----------
/// One average per position, zero where the clipped box is empty.
pub fn measure_mfrac(
    mfrac: &Image,
    rows: &[f64],
    cols: &[f64],
    box_sizes: &[i32],
    jacobian: &Jacobian,
    fwhm: Option<f64>,
) -> Vec<f64> {
    let fwhm = fwhm.unwrap_or(DEFAULT_MFRAC_FWHM);
    let sigma_px = fwhm_to_sigma(fwhm) / jacobian.scale();
    let inv_two_sigma2 = 1.0 / (2.0 * sigma_px * sigma_px);
    let (nrows, ncols) = mfrac.dim();

    let mut out = Vec::with_capacity(rows.len());
    for (&row, &col, &box_size) in izip!(rows, cols, box_sizes) {
        let half = i64::from(box_size.max(1)) / 2;
        let row_cen = row.round() as i64;
        let col_cen = col.round() as i64;
        let row_start = (row_cen - half).max(0);
        let row_end = (row_cen + half + 1).min(nrows as i64);
        let col_start = (col_cen - half).max(0);
        let col_end = (col_cen + half + 1).min(ncols as i64);

        if row_start >= row_end || col_start >= col_end {
            out.push(0.0);
            continue;
        }

        let mut wsum = 0.0f64;
        let mut msum = 0.0f64;
        for r in row_start..row_end {
            for c in col_start..col_end {
                let dr = r as f64 - row;
                let dc = c as f64 - col;
                let w = (-(dr * dr + dc * dc) * inv_two_sigma2).exp();
                wsum += w;
                msum += w * f64::from(mfrac[(r as usize, c as usize)]);
            }
        }
        out.push(if wsum > 0.0 { msum / wsum } else { 0.0 });
    }
    out
}

/// Fill the `mfrac` column of a measurement table at the reconciled
/// (`*_noshear`) positions.
///
/// A map that is identically zero short-circuits: every record gets zero
/// without sampling.
pub fn add_mfrac(
    table: &mut [ObjectRecord],
    mfrac: &Image,
    jacobian: &Jacobian,
    fwhm: Option<f64>,
) {
    if mfrac.iter().any(|&v| v > 0.0) {
        let rows: Vec<f64> = table.iter().map(|rec| rec.row_noshear).collect();
        let cols: Vec<f64> = table.iter().map(|rec| rec.col_noshear).collect();
        let boxes: Vec<i32> = table.iter().map(|rec| rec.stamp_size).collect();
        let values = measure_mfrac(mfrac, &rows, &cols, &boxes, jacobian, fwhm);
        for (rec, value) in table.iter_mut().zip(values) {
            rec.mfrac = value;
        }
    } else {
        for rec in table.iter_mut() {
            rec.mfrac = 0.0;
        }
    }
}

/// Median of a pixel map, midpoint convention for even counts.
fn median(values: &Image) -> f32 {
    let mut sorted: Vec<f32> = values.iter().copied().collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        0.5 * (sorted[mid - 1] + sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ObsList;
    use crate::observation::{Observation, PsfObservation};
    use approx::assert_relative_eq;
    use ndarray::array;
    use smallvec::smallvec;

    fn obs_with_masks(dim: usize, or_val: i32, b_val: i32, weight: f32) -> Observation {
        let jac = Jacobian::diagonal(0.2, dim as f64 / 2.0, dim as f64 / 2.0).unwrap();
        let psf = PsfObservation::new(Array2::zeros((dim, dim)), jac);
        Observation::new(
            Array2::zeros((dim, dim)),
            Array2::from_elem((dim, dim), weight),
            jac,
            psf,
        )
        .unwrap()
        .with_ormask(Array2::from_elem((dim, dim), or_val))
        .with_bmask(Array2::from_elem((dim, dim), b_val))
    }

    #[test]
    fn single_band_masks_pass_through() {
        let obs = obs_with_masks(4, 0b0101, 0b0010, 1.0);
        let expected_or = obs.ormask.clone();
        let expected_b = obs.bmask.clone();
        let mbobs: MultiBandObsList = vec![smallvec![obs] as ObsList];

        let (ormask, bmask) = get_ormask_and_bmask(&mbobs);
        assert_eq!(ormask, expected_or);
        assert_eq!(bmask, expected_b);
    }

    #[test]
    fn masks_or_across_bands_and_idempotently() {
        let mbobs: MultiBandObsList = vec![
            smallvec![obs_with_masks(4, 0b0001, 0b0100, 1.0)] as ObsList,
            smallvec![obs_with_masks(4, 0b0010, 0b1000, 1.0)] as ObsList,
        ];
        let (ormask, bmask) = get_ormask_and_bmask(&mbobs);
        assert!(ormask.iter().all(|&v| v == 0b0011));
        assert!(bmask.iter().all(|&v| v == 0b1100));

        // Same inputs, same answer.
        let (ormask2, bmask2) = get_ormask_and_bmask(&mbobs);
        assert_eq!(ormask, ormask2);
        assert_eq!(bmask, bmask2);
    }

    #[test]
    #[should_panic(expected = "one epoch")]
    fn multiple_epochs_are_rejected() {
        let mbobs: MultiBandObsList = vec![smallvec![
            obs_with_masks(4, 0, 0, 1.0),
            obs_with_masks(4, 0, 0, 1.0),
        ] as ObsList];
        let _ = get_ormask_and_bmask(&mbobs);
    }

    #[test]
    fn mfrac_zero_without_planes() {
        let mbobs: MultiBandObsList = vec![
            smallvec![obs_with_masks(4, 0, 0, 1.0)] as ObsList,
            smallvec![obs_with_masks(4, 0, 0, 2.0)] as ObsList,
        ];
        let mfrac = get_mfrac(&mbobs);
        assert!(mfrac.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn mfrac_weighted_by_median_weight() {
        let obs1 = obs_with_masks(4, 0, 0, 1.0).with_mfrac(Array2::from_elem((4, 4), 0.2));
        let obs2 = obs_with_masks(4, 0, 0, 3.0).with_mfrac(Array2::from_elem((4, 4), 0.6));
        let mbobs: MultiBandObsList =
            vec![smallvec![obs1] as ObsList, smallvec![obs2] as ObsList];
        let mfrac = get_mfrac(&mbobs);
        // (0.2 * 1 + 0.6 * 3) / (1 + 3)
        for &v in mfrac.iter() {
            assert_relative_eq!(v, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn missing_plane_still_counts_in_the_normalization() {
        let obs1 = obs_with_masks(4, 0, 0, 1.0).with_mfrac(Array2::from_elem((4, 4), 0.4));
        let obs2 = obs_with_masks(4, 0, 0, 1.0); // no mfrac plane
        let mbobs: MultiBandObsList =
            vec![smallvec![obs1] as ObsList, smallvec![obs2] as ObsList];
        let mfrac = get_mfrac(&mbobs);
        for &v in mfrac.iter() {
            assert_relative_eq!(v, 0.2, epsilon = 1e-6);
        }
    }

    #[test]
    fn median_conventions() {
        let odd = array![[1.0f32, 5.0, 2.0]];
        assert_eq!(median(&odd), 2.0);
        let even = array![[1.0f32, 2.0], [3.0, 10.0]];
        assert_eq!(median(&even), 2.5);
    }

    #[test]
    fn measure_mfrac_on_a_uniform_map() {
        let map: Image = Array2::from_elem((32, 32), 0.25);
        let jac = Jacobian::diagonal(0.2, 16.0, 16.0).unwrap();
        let values = measure_mfrac(&map, &[16.0], &[16.0], &[8], &jac, None);
        assert_relative_eq!(values[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn measure_mfrac_outside_the_map_is_zero() {
        let map: Image = Array2::from_elem((32, 32), 0.25);
        let jac = Jacobian::diagonal(0.2, 16.0, 16.0).unwrap();
        let values = measure_mfrac(&map, &[1000.0], &[1000.0], &[8], &jac, None);
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn add_mfrac_short_circuits_on_a_zero_map() {
        let map: Image = Array2::zeros((32, 32));
        let jac = Jacobian::diagonal(0.2, 16.0, 16.0).unwrap();
        let mut table = vec![ObjectRecord::default(), ObjectRecord::default()];
        // Sentinel positions would be far outside the map; the zero map
        // short-circuit never looks at them.
        add_mfrac(&mut table, &map, &jac, None);
        assert!(table.iter().all(|rec| rec.mfrac == 0.0));
    }

    #[test]
    fn add_mfrac_samples_at_noshear_positions() {
        let mut map: Image = Array2::zeros((32, 32));
        map[(10, 10)] = 1.0;
        let jac = Jacobian::diagonal(0.2, 16.0, 16.0).unwrap();
        let mut table = vec![ObjectRecord::default()];
        table[0].row_noshear = 10.0;
        table[0].col_noshear = 10.0;
        table[0].stamp_size = 8;
        add_mfrac(&mut table, &map, &jac, None);
        assert!(table[0].mfrac > 0.0);
    }
}
