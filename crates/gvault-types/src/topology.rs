use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{ObjectIdentity, ObjectRef};

/// Label disambiguating how a shape uses a referenced entity,
/// e.g. `"face:3/surface"` or `"edge:7/pcurve:face:3"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role(String);

impl Role {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    pub role: Role,
    pub reference: ObjectRef,
}

/// A shape described purely as ordered `(Role, ObjectRef)` pairs.
///
/// The record owns no geometry. Its identity is the hash of its entries, so
/// two records with the same entries in the same order are the same record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRecord {
    entries: Vec<TopologyEntry>,
}

impl TopologyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: impl Into<Role>, reference: ObjectRef) {
        self.entries.push(TopologyEntry {
            role: role.into(),
            reference,
        });
    }

    pub fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every referenced identity, one per entry, duplicates included.
    pub fn references(&self) -> Vec<ObjectIdentity> {
        self.entries.iter().map(|e| *e.reference.identity()).collect()
    }
}

impl FromIterator<(Role, ObjectRef)> for TopologyRecord {
    fn from_iter<I: IntoIterator<Item = (Role, ObjectRef)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(role, reference)| TopologyEntry { role, reference })
                .collect(),
        }
    }
}
