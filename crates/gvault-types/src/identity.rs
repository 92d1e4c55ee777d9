use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::{Digest, DIGEST_LEN};
use crate::error::TypeError;
use crate::kind::{Dimensionality, Kind};

/// Width of the fixed-width serialized form: kind tag, dimensionality tag, digest.
pub const IDENTITY_LEN: usize = 2 + DIGEST_LEN;

/// Identity of a stored object.
///
/// Ordering compares the kind first, then dimensionality, then digest, so
/// identities of different kinds never interleave in an ordered index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentity {
    kind: Kind,
    dimensionality: Dimensionality,
    digest: Digest,
}

impl ObjectIdentity {
    /// Build an identity. Dimensionality is derived from the kind.
    pub fn new(kind: Kind, digest: Digest) -> Self {
        Self {
            kind,
            dimensionality: kind.dimensionality(),
            digest,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Fixed-width serialized form.
    pub fn to_bytes(&self) -> [u8; IDENTITY_LEN] {
        let mut out = [0u8; IDENTITY_LEN];
        out[0] = self.kind.tag();
        out[1] = self.dimensionality.tag();
        out[2..].copy_from_slice(self.digest.as_bytes());
        out
    }

    /// Parse the fixed-width form, rejecting a dimensionality tag that
    /// disagrees with the kind.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != IDENTITY_LEN {
            return Err(TypeError::InvalidLength {
                expected: IDENTITY_LEN,
                actual: bytes.len(),
            });
        }
        let kind = Kind::from_tag(bytes[0])?;
        let dimensionality = Dimensionality::from_tag(bytes[1])?;
        if dimensionality != kind.dimensionality() {
            return Err(TypeError::DimensionalityMismatch {
                kind,
                dimensionality: bytes[1],
            });
        }
        let digest = Digest::from_slice(&bytes[2..])?;
        Ok(Self {
            kind,
            dimensionality,
            digest,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectIdentity({}:{})", self.kind, self.digest.short_hex())
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.digest.short_hex())
    }
}

/// Non-owning handle to a stored geometric object.
///
/// Holding an `ObjectRef` does not keep the object alive; only the archive's
/// reference counts do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef(ObjectIdentity);

impl ObjectRef {
    pub fn new(identity: ObjectIdentity) -> Self {
        Self(identity)
    }

    pub fn identity(&self) -> &ObjectIdentity {
        &self.0
    }

    pub fn kind(&self) -> Kind {
        self.0.kind()
    }
}

impl From<ObjectIdentity> for ObjectRef {
    fn from(identity: ObjectIdentity) -> Self {
        Self(identity)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a stored topology record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopologyRef(ObjectIdentity);

impl TopologyRef {
    /// Wrap an identity. Returns `None` unless it names a topology record.
    pub fn new(identity: ObjectIdentity) -> Option<Self> {
        (identity.kind() == Kind::TopologyRecord).then_some(Self(identity))
    }

    pub fn identity(&self) -> &ObjectIdentity {
        &self.0
    }
}

impl fmt::Display for TopologyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
