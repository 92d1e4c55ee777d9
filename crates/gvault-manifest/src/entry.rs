use serde::{Deserialize, Serialize};

use gvault_types::{Kind, KindFamily, ObjectIdentity};

/// Physical position of a record inside its family's payload segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Byte offset of the record header.
    pub offset: u64,
    /// Total record length, header included.
    pub length: u64,
}

impl Locator {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// One catalog entry per stored object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub identity: ObjectIdentity,
    pub locator: Locator,
    pub ref_count: u64,
    /// Unix milliseconds of first insertion.
    pub created_at: u64,
    /// Stored objects this one holds a reference on.
    pub references: Vec<ObjectIdentity>,
}

impl ManifestEntry {
    pub fn kind(&self) -> Kind {
        self.identity.kind()
    }

    pub fn family(&self) -> KindFamily {
        self.identity.kind().family()
    }
}

/// A record recovered by scanning a payload segment, already validated
/// against its checksum and recomputed digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScannedRecord {
    /// An object record. `entry.ref_count` is the count written with it.
    Object(ManifestEntry),
    /// A later change to an object's reference count.
    Delta {
        identity: ObjectIdentity,
        delta: i64,
    },
}
