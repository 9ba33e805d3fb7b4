use thiserror::Error;

/// Error type shared by every fallible operation in the crate.
///
/// Two failure tiers flow through this enum. Configuration and data-model
/// errors are global: they abort the calling pipeline. `BootPsfFailure` is
/// special-cased by the single-object pipeline, which absorbs it into the
/// result (PSF summary flags, or a null shear map) instead of propagating.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetadetectError {
    #[error("Unknown measurement type: {0}")]
    UnknownMeasType(String),

    #[error("Unknown deblender: {0}")]
    UnknownDeblender(String),

    #[error("Unknown shear variant: {0}")]
    UnknownShearVariant(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("PSF bootstrap failed: {0}")]
    BootPsfFailure(String),

    #[error("Missing {0} exposure on observation")]
    MissingExposure(String),

    #[error("Shear generator did not produce the requested {0} variant")]
    MissingVariant(String),

    #[error("Observation set is empty or has an empty band")]
    EmptyObservationSet,

    #[error("Mismatched image dimensions: {0}")]
    MismatchedDimensions(String),

    #[error("Degenerate jacobian: {0}")]
    DegenerateJacobian(String),

    #[error("No {0} measurer registered for the configured mode")]
    MissingMeasurer(String),
}
