use std::io;

use gvault_hash::HashError;
use gvault_manifest::ManifestError;
use gvault_types::{Kind, KindFamily, ObjectIdentity};

/// Errors from typed store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The kind does not belong to this store's family.
    #[error("kind {kind} is not stored in the {family} store")]
    UnsupportedKind { kind: Kind, family: KindFamily },

    #[error("object not found: {0}")]
    NotFound(ObjectIdentity),

    /// Checksum, decoding, or digest validation failed.
    #[error("corrupt payload for {identity}: {reason}")]
    CorruptPayload {
        identity: ObjectIdentity,
        reason: String,
    },

    /// The manifest and a payload segment disagree.
    #[error("manifest inconsistent with payload: {0}")]
    ManifestInconsistent(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl StoreError {
    /// Whether retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) | Self::Manifest(ManifestError::Io(e)) => {
                crate::retry::is_transient(e)
            }
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
