//! # Detection surface of the multi-object-fit pipeline
//!
//! Source extraction, stamp extraction and friends-of-friends linking are
//! external backends; [`Medsifier`] is the crate-side contract. Detection
//! runs on the sheared pixels while the stamp interface is built over the
//! original pixels reusing the sheared segmentation: the measured pixels
//! stay consistent with the calibration while detection follows where the
//! signal moved.
use ndarray::Array2;

use crate::configs::{FofConfig, MedsConfig, SxConfig};
use crate::constants::MultiBandObsList;
use crate::metadetect_errors::MetadetectError;

/// One extracted source, SEP axis convention (`x` is the column).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SxObject {
    pub x: f64,
    pub y: f64,
    pub flux: f64,
}

/// Catalog and segmentation map from one source-extraction pass.
#[derive(Debug, Clone)]
pub struct SxCatalog {
    /// Segmentation over the detection image; 0 is background, object `i`
    /// owns the pixels labeled `i + 1`.
    pub seg: Array2<i32>,
    pub objects: Vec<SxObject>,
}

impl SxCatalog {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Indices of the catalog entries linked into one joint-fit group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FofGroup {
    pub members: Vec<usize>,
}

/// External detection, stamp-extraction and grouping backend.
///
/// The three steps are called in order by the multi-object-fit
/// orchestrator; `mbobs_list` and `fof_groups` consume the catalog
/// produced by `medsify` and must preserve its object order.
pub trait Medsifier {
    /// Extract sources and a segmentation map from the sheared pixels.
    fn medsify(
        &self,
        sheared_mbobs: &MultiBandObsList,
        sx: &SxConfig,
        meds: &MedsConfig,
    ) -> Result<SxCatalog, MetadetectError>;

    /// Build one per-object observation set per catalog entry, cutting
    /// stamps from the original pixels under the sheared segmentation.
    fn mbobs_list(
        &self,
        orig_mbobs: &MultiBandObsList,
        catalog: &SxCatalog,
        meds: &MedsConfig,
    ) -> Result<Vec<MultiBandObsList>, MetadetectError>;

    /// Link catalog entries into friends-of-friends groups.
    fn fof_groups(
        &self,
        catalog: &SxCatalog,
        fofs: &FofConfig,
    ) -> Result<Vec<FofGroup>, MetadetectError>;
}
