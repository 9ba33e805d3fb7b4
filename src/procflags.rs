//! # Processing flags
//!
//! Bit-flag vocabulary describing why a measurement degraded or failed.
//! The low bits are inherited from the moments-fitter layer so that fitter
//! flags can be OR-combined directly into a record; pipeline-level codes
//! start at bit 16 to stay clear of that base set.
//!
//! Flags compose with `|`, and [`describe`] renders a composite value back
//! into a `|`-joined human-readable string. A value of zero means "no
//! failure" and renders as the empty string.
use std::sync::LazyLock;

// --- Base codes inherited from the moments-fitter layer (bits 0..=14) ---

/// No measurement was attempted for this record
pub const NO_ATTEMPT: u32 = 1;
/// Centroid moved too far from the starting position
pub const CEN_SHIFT: u32 = 1 << 4;
/// Measured flux was not positive
pub const NONPOS_FLUX: u32 = 1 << 5;
/// Measured size T was not positive
pub const NONPOS_SIZE: u32 = 1 << 6;
/// Moments matrix determinant near zero
pub const LOW_DET: u32 = 1 << 7;
/// Iterative fit hit its iteration cap
pub const MAXITER: u32 = 1 << 8;
/// Flux variance was not positive
pub const NONPOS_VAR: u32 = 1 << 9;
/// Mixture evaluation range error
pub const GMIX_RANGE_ERROR: u32 = 1 << 10;
/// Shape variance was not positive
pub const NONPOS_SHAPE_VAR: u32 = 1 << 11;
/// Moments eigenvalues were not finite
pub const EIG_NOTFINITE: u32 = 1 << 12;
/// Division by zero during the fit
pub const DIV_ZERO: u32 = 1 << 13;
/// Summed flux was exactly zero
pub const ZERO_FLUX: u32 = 1 << 14;

// --- Pipeline codes, starting at bit 16 ---

/// Object bounding box hit the exposure edge
pub const EDGE_HIT: u32 = 1 << 16;
/// PSF characterization failed
pub const PSF_FAILURE: u32 = 1 << 17;
/// Object fit failed
pub const OBJ_FAILURE: u32 = 1 << 18;
/// Fit produced no usable moments
pub const NOMOMENTS_FAILURE: u32 = 1 << 19;
/// Object bounding box could not be constructed
pub const BAD_BBOX: u32 = 1 << 20;
/// Weight map was identically zero
pub const ZERO_WEIGHTS: u32 = 1 << 21;
/// Input data missing or unusable
pub const NO_DATA: u32 = 1 << 22;

const BASE_NAMES: &[(u32, &str)] = &[
    (NO_ATTEMPT, "no attempt"),
    (CEN_SHIFT, "center shifted too far"),
    (NONPOS_FLUX, "flux <= 0"),
    (NONPOS_SIZE, "T <= 0"),
    (LOW_DET, "determinant near zero"),
    (MAXITER, "max iterations reached"),
    (NONPOS_VAR, "flux var <= 0"),
    (GMIX_RANGE_ERROR, "range error"),
    (NONPOS_SHAPE_VAR, "shape var <= 0"),
    (EIG_NOTFINITE, "eigenvalues not finite"),
    (DIV_ZERO, "division by zero"),
    (ZERO_FLUX, "zero flux"),
];

const LOCAL_NAMES: &[(u32, &str)] = &[
    (EDGE_HIT, "bbox hit edge"),
    (PSF_FAILURE, "PSF fit failed"),
    (OBJ_FAILURE, "object fit failed"),
    (NOMOMENTS_FAILURE, "no moments"),
    (BAD_BBOX, "problem making bounding box"),
    (ZERO_WEIGHTS, "weights all zero"),
    (NO_DATA, "no/missing data"),
];

/// Immutable flag registry, assembled once by extending the base (fitter)
/// vocabulary with the pipeline codes. Safe for concurrent reads.
static NAME_MAP: LazyLock<Vec<(u32, &'static str)>> = LazyLock::new(|| {
    BASE_NAMES
        .iter()
        .chain(LOCAL_NAMES.iter())
        .copied()
        .collect()
});

/// Look up the description registered for a single flag bit.
fn name_for(flag: u32) -> Option<&'static str> {
    NAME_MAP
        .iter()
        .find_map(|&(val, name)| (val == flag).then_some(name))
}

/// Look up the flag value registered under `name`.
///
/// This is the inverse of [`describe`] for single-bit values.
pub fn flag_for_name(name: &str) -> Option<u32> {
    NAME_MAP
        .iter()
        .find_map(|&(val, reg_name)| (reg_name == name).then_some(val))
}

/// Render a composite flag value as a `|`-joined description string.
///
/// Bits are reported in ascending order. Set bits with no registered
/// description are reported as `unrecognized bit <n>` rather than being
/// dropped or raising an error. `describe(0)` is the empty string.
///
/// Example
/// -----------------
/// ```
/// use metadetect::procflags::{describe, EDGE_HIT, ZERO_WEIGHTS};
///
/// assert_eq!(describe(0), "");
/// assert_eq!(describe(EDGE_HIT), "bbox hit edge");
/// assert_eq!(
///     describe(EDGE_HIT | ZERO_WEIGHTS),
///     "bbox hit edge|weights all zero",
/// );
/// ```
pub fn describe(flags: u32) -> String {
    let mut parts: Vec<String> = Vec::new();
    for bit in 0..u32::BITS {
        let val = 1u32 << bit;
        if flags & val == 0 {
            continue;
        }
        match name_for(val) {
            Some(name) => parts.push(name.to_string()),
            None => parts.push(format!("unrecognized bit {bit}")),
        }
    }
    parts.join("|")
}
