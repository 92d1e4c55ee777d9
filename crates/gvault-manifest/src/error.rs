use std::path::PathBuf;

use gvault_types::ObjectIdentity;

/// Errors from manifest operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// No manifest file exists at the expected location.
    #[error("manifest not found at {0}")]
    Missing(PathBuf),

    /// The manifest file failed magic, length, or checksum validation.
    #[error("corrupt manifest: {0}")]
    Corrupt(String),

    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),

    /// An entry for this identity already exists.
    #[error("manifest entry already present: {0}")]
    Duplicate(ObjectIdentity),

    #[error("no manifest entry for {0}")]
    NotFound(ObjectIdentity),

    /// A decrement would take the reference count below zero.
    #[error("reference count of {0} would drop below zero")]
    Underflow(ObjectIdentity),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
