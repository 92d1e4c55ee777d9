use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use gvault_types::{KindFamily, ObjectIdentity};

use crate::entry::{Locator, ManifestEntry, ScannedRecord};
use crate::error::{ManifestError, ManifestResult};

const MAGIC: &[u8; 4] = b"GVM1";
const FORMAT_VERSION: u32 = 1;
/// magic + version + crc + body length
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Default, Serialize, Deserialize)]
struct ManifestBody {
    watermarks: BTreeMap<KindFamily, u64>,
    entries: Vec<ManifestEntry>,
}

#[derive(Default)]
struct State {
    entries: BTreeMap<ObjectIdentity, ManifestEntry>,
    /// Segment length per family at the last save.
    watermarks: BTreeMap<KindFamily, u64>,
}

/// What [`Manifest::rebuild`] found while replaying scanned records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub objects: usize,
    pub deltas: usize,
    /// Object records seen again after their first occurrence.
    pub duplicates: usize,
    /// Delta records whose object record was never seen.
    pub orphan_deltas: usize,
}

/// In-memory catalog backed by one file.
///
/// All methods take `&self`; the catalog is guarded by an internal lock held
/// only for the duration of each call.
pub struct Manifest {
    path: PathBuf,
    state: RwLock<State>,
}

impl Manifest {
    /// An empty catalog that has not been written yet.
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: RwLock::new(State::default()),
        }
    }

    /// Create an empty catalog and persist it.
    pub fn create(path: &Path) -> ManifestResult<Self> {
        let manifest = Self::empty(path);
        manifest.save()?;
        Ok(manifest)
    }

    /// Load a catalog, validating magic, version, length, and checksum.
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let body = decode(&data)?;

        let entries = body
            .entries
            .into_iter()
            .map(|e| (e.identity, e))
            .collect::<BTreeMap<_, _>>();
        debug!(path = %path.display(), entries = entries.len(), "manifest loaded");

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(State {
                entries,
                watermarks: body.watermarks,
            }),
        })
    }

    /// Atomically persist the catalog.
    pub fn save(&self) -> ManifestResult<()> {
        let bytes = {
            let state = self.state.read().expect("lock poisoned");
            encode(&ManifestBody {
                watermarks: state.watermarks.clone(),
                entries: state.entries.values().cloned().collect(),
            })?
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ManifestError::Io(e.error))?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "manifest saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add the entry for a newly stored object.
    pub fn append(&self, entry: ManifestEntry) -> ManifestResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.entries.contains_key(&entry.identity) {
            return Err(ManifestError::Duplicate(entry.identity));
        }
        state.entries.insert(entry.identity, entry);
        Ok(())
    }

    /// Apply a signed change to an entry's reference count, returning the new
    /// count.
    pub fn update_reference_count(
        &self,
        identity: &ObjectIdentity,
        delta: i64,
    ) -> ManifestResult<u64> {
        let mut state = self.state.write().expect("lock poisoned");
        let entry = state
            .entries
            .get_mut(identity)
            .ok_or(ManifestError::NotFound(*identity))?;
        entry.ref_count = apply_delta(entry.ref_count, delta)
            .ok_or(ManifestError::Underflow(*identity))?;
        Ok(entry.ref_count)
    }

    pub fn get(&self, identity: &ObjectIdentity) -> Option<ManifestEntry> {
        self.state
            .read()
            .expect("lock poisoned")
            .entries
            .get(identity)
            .cloned()
    }

    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .entries
            .contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry in identity order.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.state
            .read()
            .expect("lock poisoned")
            .entries
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of one family's entries in identity order.
    pub fn family_entries(&self, family: KindFamily) -> Vec<ManifestEntry> {
        self.state
            .read()
            .expect("lock poisoned")
            .entries
            .values()
            .filter(|e| e.family() == family)
            .cloned()
            .collect()
    }

    /// Drop an entry. Used by compaction once its record is gone.
    pub fn remove(&self, identity: &ObjectIdentity) -> ManifestResult<ManifestEntry> {
        self.state
            .write()
            .expect("lock poisoned")
            .entries
            .remove(identity)
            .ok_or(ManifestError::NotFound(*identity))
    }

    /// Point an entry at its new position after a segment rewrite.
    pub fn relocate(&self, identity: &ObjectIdentity, locator: Locator) -> ManifestResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let entry = state
            .entries
            .get_mut(identity)
            .ok_or(ManifestError::NotFound(*identity))?;
        entry.locator = locator;
        Ok(())
    }

    pub fn watermark(&self, family: KindFamily) -> Option<u64> {
        self.state
            .read()
            .expect("lock poisoned")
            .watermarks
            .get(&family)
            .copied()
    }

    pub fn set_watermark(&self, family: KindFamily, length: u64) {
        self.state
            .write()
            .expect("lock poisoned")
            .watermarks
            .insert(family, length);
    }

    /// Swap in the contents of another catalog, keeping this one's path.
    pub fn replace(&self, other: Manifest) {
        let other = other.state.into_inner().expect("lock poisoned");
        *self.state.write().expect("lock poisoned") = other;
    }

    /// Reconstruct a catalog from scanned payload records, in scan order.
    ///
    /// Object records create entries; delta records adjust the count of an
    /// entry seen earlier. Nothing is written to disk.
    pub fn rebuild(
        path: &Path,
        records: impl IntoIterator<Item = ScannedRecord>,
    ) -> (Self, RebuildSummary) {
        let mut entries: BTreeMap<ObjectIdentity, ManifestEntry> = BTreeMap::new();
        let mut summary = RebuildSummary::default();

        for record in records {
            match record {
                ScannedRecord::Object(entry) => {
                    if entries.contains_key(&entry.identity) {
                        warn!(identity = %entry.identity, "duplicate object record; keeping first");
                        summary.duplicates += 1;
                        continue;
                    }
                    summary.objects += 1;
                    entries.insert(entry.identity, entry);
                }
                ScannedRecord::Delta { identity, delta } => {
                    let Some(entry) = entries.get_mut(&identity) else {
                        warn!(%identity, delta, "reference delta for unknown object; skipping");
                        summary.orphan_deltas += 1;
                        continue;
                    };
                    entry.ref_count = apply_delta(entry.ref_count, delta).unwrap_or_else(|| {
                        warn!(%identity, delta, "reference delta underflows; clamping to zero");
                        0
                    });
                    summary.deltas += 1;
                }
            }
        }

        info!(
            objects = summary.objects,
            deltas = summary.deltas,
            duplicates = summary.duplicates,
            orphan_deltas = summary.orphan_deltas,
            "manifest rebuilt"
        );
        let manifest = Self {
            path: path.to_path_buf(),
            state: RwLock::new(State {
                entries,
                watermarks: BTreeMap::new(),
            }),
        };
        (manifest, summary)
    }
}

fn apply_delta(count: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        count.checked_add(delta as u64)
    } else {
        count.checked_sub(delta.unsigned_abs())
    }
}

fn encode(body: &ManifestBody) -> ManifestResult<Vec<u8>> {
    let payload =
        bincode::serialize(body).map_err(|e| ManifestError::Serialization(e.to_string()))?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode(data: &[u8]) -> ManifestResult<ManifestBody> {
    if data.len() < HEADER_LEN {
        return Err(ManifestError::Corrupt("too short".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(ManifestError::Corrupt(format!(
            "bad magic {:?}",
            String::from_utf8_lossy(&data[0..4])
        )));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(ManifestError::UnsupportedVersion(version));
    }
    let expected_crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[12..20]);
    let length = u64::from_le_bytes(len_bytes);

    let payload = &data[HEADER_LEN..];
    if payload.len() as u64 != length {
        return Err(ManifestError::Corrupt(format!(
            "body length {} does not match header {}",
            payload.len(),
            length
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(ManifestError::Corrupt(format!(
            "checksum mismatch: expected {expected_crc:#010x}, computed {actual_crc:#010x}"
        )));
    }
    bincode::deserialize(payload).map_err(|e| ManifestError::Corrupt(e.to_string()))
}
