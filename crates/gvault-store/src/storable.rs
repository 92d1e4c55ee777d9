use serde::de::DeserializeOwned;
use serde::Serialize;

use gvault_hash::{CanonicalHasher, HashResult};
use gvault_types::{Entity, ObjectIdentity, TopologyRecord};

/// A value a [`TypedStore`](crate::TypedStore) can hold.
///
/// The body written to disk is the value's bincode encoding; its identity is
/// always recomputed from the value, never trusted from the record header.
pub trait Storable: Serialize + DeserializeOwned + Send + Sync {
    /// Canonical identity of the value.
    fn identity(&self, hasher: &CanonicalHasher) -> HashResult<ObjectIdentity>;

    /// Stored objects this value holds a reference on.
    fn references(&self) -> Vec<ObjectIdentity>;
}

impl Storable for Entity {
    fn identity(&self, hasher: &CanonicalHasher) -> HashResult<ObjectIdentity> {
        hasher.identity_of(self)
    }

    fn references(&self) -> Vec<ObjectIdentity> {
        Entity::references(self)
    }
}

impl Storable for TopologyRecord {
    fn identity(&self, hasher: &CanonicalHasher) -> HashResult<ObjectIdentity> {
        Ok(hasher.topology_identity(self))
    }

    fn references(&self) -> Vec<ObjectIdentity> {
        TopologyRecord::references(self)
    }
}
