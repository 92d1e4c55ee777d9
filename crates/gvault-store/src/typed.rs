use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tracing::{debug, info, warn};

use gvault_hash::CanonicalHasher;
use gvault_manifest::{Locator, Manifest, ManifestEntry, ScannedRecord};
use gvault_types::{KindFamily, ObjectIdentity};

use crate::cancel::CancelToken;
use crate::error::{StoreError, StoreResult};
use crate::record::{Record, RecordValue};
use crate::retry::RetryPolicy;
use crate::segment::{PayloadSegment, SegmentRewriter};
use crate::storable::Storable;

/// Result of [`TypedStore::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    pub identity: ObjectIdentity,
    /// `true` when a new payload was written, `false` on a dedup hit.
    pub created: bool,
    pub ref_count: u64,
}

/// A record the scanner could not use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorruptRecord {
    pub offset: u64,
    /// The identity named by the header, when it could be parsed.
    pub identity: Option<ObjectIdentity>,
    pub reason: String,
}

/// Everything a scan recovered from one segment.
#[derive(Clone, Debug, Default)]
pub struct ScanReport {
    pub records: Vec<ScannedRecord>,
    pub corrupt: Vec<CorruptRecord>,
    pub truncated_at: Option<u64>,
    pub segment_len: u64,
}

/// Deduplicating store for one kind family.
///
/// The family's segment sits behind an `RwLock`: `put`, `acquire` and
/// `release` take the write side so the check-then-insert is atomic, while
/// `get`, `verify` and `scan` share the read side.
pub struct TypedStore<T> {
    family: KindFamily,
    path: PathBuf,
    segment: RwLock<PayloadSegment>,
    manifest: Arc<Manifest>,
    hasher: CanonicalHasher,
    retry: RetryPolicy,
    _value: PhantomData<fn() -> T>,
}

impl<T: Storable> TypedStore<T> {
    /// Location of a family's segment under a payload directory.
    pub fn segment_path(dir: &Path, family: KindFamily) -> PathBuf {
        dir.join(format!("{}.gvp", family.name()))
    }

    /// Create an empty segment for `family` under `dir`.
    pub fn create(
        dir: &Path,
        family: KindFamily,
        manifest: Arc<Manifest>,
        hasher: CanonicalHasher,
        retry: RetryPolicy,
    ) -> StoreResult<Self> {
        let path = Self::segment_path(dir, family);
        let segment = PayloadSegment::create(&path, retry)?;
        Ok(Self::with_segment(family, path, segment, manifest, hasher, retry))
    }

    /// Open the existing segment for `family` under `dir`.
    pub fn open(
        dir: &Path,
        family: KindFamily,
        manifest: Arc<Manifest>,
        hasher: CanonicalHasher,
        retry: RetryPolicy,
    ) -> StoreResult<Self> {
        let path = Self::segment_path(dir, family);
        let segment = PayloadSegment::open(&path, retry)?;
        Ok(Self::with_segment(family, path, segment, manifest, hasher, retry))
    }

    fn with_segment(
        family: KindFamily,
        path: PathBuf,
        segment: PayloadSegment,
        manifest: Arc<Manifest>,
        hasher: CanonicalHasher,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            family,
            path,
            segment: RwLock::new(segment),
            manifest,
            hasher,
            retry,
            _value: PhantomData,
        }
    }

    pub fn family(&self) -> KindFamily {
        self.family
    }

    fn check_family(&self, identity: &ObjectIdentity) -> StoreResult<()> {
        if identity.kind().family() != self.family {
            return Err(StoreError::UnsupportedKind {
                kind: identity.kind(),
                family: self.family,
            });
        }
        Ok(())
    }

    /// Insert `value` if absent, otherwise take another reference on the
    /// existing copy. Never writes a second payload for equal content.
    pub fn put(&self, value: &T) -> StoreResult<PutOutcome> {
        let identity = value.identity(&self.hasher)?;
        self.check_family(&identity)?;

        let mut segment = self.segment.write().expect("lock poisoned");
        if self.manifest.contains(&identity) {
            let ref_count = self.append_delta(&mut segment, &identity, 1)?;
            debug!(%identity, ref_count, "dedup hit");
            return Ok(PutOutcome {
                identity,
                created: false,
                ref_count,
            });
        }

        let body =
            bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let created_at = now_millis();
        let locator = segment.append(&Record::encode_object(&identity, 1, created_at, &body))?;
        self.manifest.append(ManifestEntry {
            identity,
            locator,
            ref_count: 1,
            created_at,
            references: value.references(),
        })?;
        debug!(%identity, offset = locator.offset, len = locator.length, "object stored");

        Ok(PutOutcome {
            identity,
            created: true,
            ref_count: 1,
        })
    }

    /// Load and fully validate a stored value.
    pub fn get(&self, identity: &ObjectIdentity) -> StoreResult<T> {
        self.check_family(identity)?;
        let entry = self
            .manifest
            .get(identity)
            .ok_or(StoreError::NotFound(*identity))?;
        let segment = self.segment.read().expect("lock poisoned");
        self.load(&segment, &entry)
    }

    /// Re-read an entry's record and check checksum, header, and digest.
    pub fn verify(&self, entry: &ManifestEntry) -> StoreResult<()> {
        self.check_family(&entry.identity)?;
        let segment = self.segment.read().expect("lock poisoned");
        self.load(&segment, entry).map(|_| ())
    }

    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        identity.kind().family() == self.family && self.manifest.contains(identity)
    }

    /// Take one more reference on a stored object.
    pub fn acquire(&self, identity: &ObjectIdentity) -> StoreResult<u64> {
        self.check_family(identity)?;
        let mut segment = self.segment.write().expect("lock poisoned");
        if !self.manifest.contains(identity) {
            return Err(StoreError::NotFound(*identity));
        }
        self.append_delta(&mut segment, identity, 1)
    }

    /// Drop one reference. The payload stays until compaction.
    pub fn release(&self, identity: &ObjectIdentity) -> StoreResult<u64> {
        self.check_family(identity)?;
        let mut segment = self.segment.write().expect("lock poisoned");
        let entry = self
            .manifest
            .get(identity)
            .ok_or(StoreError::NotFound(*identity))?;
        if entry.ref_count == 0 {
            return Err(gvault_manifest::ManifestError::Underflow(*identity).into());
        }
        self.append_delta(&mut segment, identity, -1)
    }

    pub fn segment_len(&self) -> u64 {
        self.segment.read().expect("lock poisoned").len()
    }

    /// Recover catalog records from the segment alone.
    ///
    /// Object bodies are decoded and their digest recomputed; records whose
    /// digest disagrees with the header are reported, not returned.
    pub fn scan(&self) -> StoreResult<ScanReport> {
        let segment = self.segment.read().expect("lock poisoned");
        let scan = segment.scan()?;
        let mut report = ScanReport {
            truncated_at: scan.truncated_at,
            segment_len: segment.len(),
            ..ScanReport::default()
        };

        for (offset, fault) in scan.faults {
            report.corrupt.push(CorruptRecord {
                offset,
                identity: None,
                reason: fault.to_string(),
            });
        }

        for (locator, record) in scan.records {
            let identity = record.header.identity;
            let corrupt = |reason: String| CorruptRecord {
                offset: locator.offset,
                identity: Some(identity),
                reason,
            };
            if identity.kind().family() != self.family {
                report.corrupt.push(corrupt(format!(
                    "{} record in the {} segment",
                    identity.kind(),
                    self.family
                )));
                continue;
            }
            match record.header.value {
                RecordValue::Delta { delta } => {
                    report.records.push(ScannedRecord::Delta { identity, delta });
                }
                RecordValue::Object { ref_count } => match self.decode_body(&identity, &record.body)
                {
                    Ok(value) => report.records.push(ScannedRecord::Object(ManifestEntry {
                        identity,
                        locator,
                        ref_count,
                        created_at: record.header.created_at,
                        references: value.references(),
                    })),
                    Err(e) => {
                        warn!(
                            %identity,
                            offset = locator.offset,
                            error = %e,
                            "unusable object record"
                        );
                        report.corrupt.push(corrupt(e.to_string()));
                    }
                },
            }
        }

        for c in &report.corrupt {
            warn!(
                family = %self.family,
                offset = c.offset,
                reason = %c.reason,
                "corrupt record found by scan"
            );
        }
        Ok(report)
    }

    /// Hold the family's write lock across a multi-step pass (flush,
    /// compaction).
    pub fn lock_exclusive(&self) -> SegmentGuard<'_, T> {
        SegmentGuard {
            store: self,
            segment: self.segment.write().expect("lock poisoned"),
        }
    }

    fn append_delta(
        &self,
        segment: &mut PayloadSegment,
        identity: &ObjectIdentity,
        delta: i64,
    ) -> StoreResult<u64> {
        segment.append(&Record::encode_delta(identity, delta, now_millis()))?;
        Ok(self.manifest.update_reference_count(identity, delta)?)
    }

    fn load(&self, segment: &PayloadSegment, entry: &ManifestEntry) -> StoreResult<T> {
        self.load_record(segment, entry).map(|(value, _)| value)
    }

    fn load_record(
        &self,
        segment: &PayloadSegment,
        entry: &ManifestEntry,
    ) -> StoreResult<(T, Record)> {
        let identity = entry.identity;
        if entry.locator.end() > segment.len() {
            return Err(StoreError::ManifestInconsistent(format!(
                "{identity} located at {}..{} but the {} segment is {} bytes",
                entry.locator.offset,
                entry.locator.end(),
                self.family,
                segment.len()
            )));
        }
        let bytes = segment.read(&entry.locator)?;
        let record = Record::decode(&bytes).map_err(|fault| StoreError::CorruptPayload {
            identity,
            reason: fault.to_string(),
        })?;
        if record.header.identity != identity {
            return Err(StoreError::CorruptPayload {
                identity,
                reason: format!("record header names {}", record.header.identity),
            });
        }
        if !matches!(record.header.value, RecordValue::Object { .. }) {
            return Err(StoreError::CorruptPayload {
                identity,
                reason: "locator points at a delta record".into(),
            });
        }
        let value = self.decode_body(&identity, &record.body)?;
        Ok((value, record))
    }

    fn decode_body(&self, identity: &ObjectIdentity, body: &[u8]) -> StoreResult<T> {
        let corrupt = |reason: String| StoreError::CorruptPayload {
            identity: *identity,
            reason,
        };
        let value: T = bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))?;
        let recomputed = value
            .identity(&self.hasher)
            .map_err(|e| corrupt(e.to_string()))?;
        if recomputed != *identity {
            return Err(corrupt(format!(
                "recomputed digest {} does not match stored {}",
                recomputed.digest().short_hex(),
                identity.digest().short_hex()
            )));
        }
        Ok(value)
    }
}

/// A family's segment held exclusively.
pub struct SegmentGuard<'a, T> {
    store: &'a TypedStore<T>,
    segment: RwLockWriteGuard<'a, PayloadSegment>,
}

/// A fully written replacement segment, not yet swapped in.
pub struct PreparedSegment {
    rewriter: SegmentRewriter,
    kept: Vec<(ObjectIdentity, Locator, u64)>,
    dropped: Vec<ObjectIdentity>,
    pub bytes_before: u64,
}

impl PreparedSegment {
    pub fn bytes_after(&self) -> u64 {
        self.rewriter.len()
    }

    pub fn dropped(&self) -> &[ObjectIdentity] {
        &self.dropped
    }
}

impl<T: Storable> SegmentGuard<'_, T> {
    pub fn family(&self) -> KindFamily {
        self.store.family
    }

    /// Flush the segment (fsyncing when asked) and return its length.
    pub fn sync(&mut self, fsync: bool) -> StoreResult<u64> {
        self.segment.sync(fsync)?;
        Ok(self.segment.len())
    }

    /// Cut a torn tail found by [`TypedStore::scan`].
    pub fn truncate(&mut self, len: u64) -> StoreResult<()> {
        warn!(
            family = %self.store.family,
            from = self.segment.len(),
            to = len,
            "truncating torn segment tail"
        );
        self.segment.truncate(len)?;
        Ok(())
    }

    /// Write a replacement segment holding every entry not in `doomed`, each as
    /// a single object record carrying its count from `counts` (or its current
    /// count). Delta records are folded away.
    ///
    /// Returns `None` if cancelled; nothing has changed in that case.
    pub fn prepare(
        &self,
        doomed: &HashSet<ObjectIdentity>,
        counts: &HashMap<ObjectIdentity, u64>,
        cancel: &CancelToken,
    ) -> StoreResult<Option<PreparedSegment>> {
        let store = self.store;
        let mut entries = store.manifest.family_entries(store.family);
        entries.sort_by_key(|e| e.locator.offset);

        let mut rewriter = SegmentRewriter::new(&store.path)?;
        let mut kept = Vec::with_capacity(entries.len());
        let mut dropped = Vec::new();

        for entry in entries {
            if cancel.is_cancelled() {
                debug!(family = %store.family, "compaction cancelled during rewrite");
                return Ok(None);
            }
            if doomed.contains(&entry.identity) {
                dropped.push(entry.identity);
                continue;
            }
            let (_, record) = store.load_record(&self.segment, &entry)?;
            let ref_count = counts
                .get(&entry.identity)
                .copied()
                .unwrap_or(entry.ref_count);
            let locator = rewriter.append(&Record::encode_object(
                &entry.identity,
                ref_count,
                record.header.created_at,
                &record.body,
            ))?;
            kept.push((entry.identity, locator, ref_count));
        }

        Ok(Some(PreparedSegment {
            rewriter,
            kept,
            dropped,
            bytes_before: self.segment.len(),
        }))
    }

    /// Swap the replacement in and update the catalog to match.
    pub fn commit(&mut self, prepared: PreparedSegment) -> StoreResult<()> {
        let store = self.store;
        let bytes_after = prepared.bytes_after();
        *self.segment = prepared.rewriter.commit(&store.path, store.retry)?;

        for identity in &prepared.dropped {
            store.manifest.remove(identity)?;
        }
        for (identity, locator, ref_count) in &prepared.kept {
            store.manifest.relocate(identity, *locator)?;
            if let Some(entry) = store.manifest.get(identity) {
                let delta = *ref_count as i64 - entry.ref_count as i64;
                if delta != 0 {
                    store.manifest.update_reference_count(identity, delta)?;
                }
            }
        }
        store.manifest.set_watermark(store.family, self.segment.len());

        info!(
            family = %store.family,
            dropped = prepared.dropped.len(),
            kept = prepared.kept.len(),
            bytes_before = prepared.bytes_before,
            bytes_after,
            "segment compacted"
        );
        Ok(())
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
