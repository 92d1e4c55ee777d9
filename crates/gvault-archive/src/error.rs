use std::io;
use std::path::PathBuf;

use gvault_hash::HashError;
use gvault_manifest::ManifestError;
use gvault_store::{retry, StoreError};
use gvault_types::{Kind, KindFamily, ObjectIdentity, TypeError};

/// Errors surfaced by the archive façade.
///
/// Store, manifest and hashing errors pass through unchanged inside the
/// `#[from]` variants.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive is not open")]
    NotOpen,

    #[error("an archive already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("no archive at {0}")]
    NotAnArchive(PathBuf),

    /// A stored object or topology record refers to something the archive
    /// does not hold.
    #[error("{referrer} refers to missing object {missing}")]
    DanglingReference {
        referrer: String,
        missing: ObjectIdentity,
    },

    #[error("{kind} needs a {expected} basis, got a {actual} one")]
    InvalidBasis {
        kind: Kind,
        expected: KindFamily,
        actual: KindFamily,
    },

    /// The manifest and the payload segments disagree; run a rebuild.
    #[error("manifest inconsistent with payload: {0}")]
    ManifestInconsistent(String),

    /// The geometry kernel failed to extract or reconstruct a shape.
    #[error("geometry kernel error: {0}")]
    Kernel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ArchiveError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) | Self::Manifest(ManifestError::Io(e)) => retry::is_transient(e),
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the identity named by a not-found error is `identity`.
    pub(crate) fn is_not_found(&self, identity: &ObjectIdentity) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(missing)) if missing == identity)
    }
}

/// Result alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
