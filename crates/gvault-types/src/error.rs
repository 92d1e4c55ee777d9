use thiserror::Error;

use crate::kind::Kind;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown kind tag: {0:#04x}")]
    UnknownKindTag(u8),

    #[error("unknown dimensionality tag: {0}")]
    UnknownDimensionality(u8),

    #[error("dimensionality {dimensionality} does not match kind {kind}")]
    DimensionalityMismatch { kind: Kind, dimensionality: u8 },

    #[error("{kind} basis is still inline; store it before extracting parameters")]
    UnresolvedBasis { kind: Kind },
}
