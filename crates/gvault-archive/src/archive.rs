use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use gvault_manifest::{Manifest, ManifestEntry, RebuildSummary};
use gvault_store::{CorruptRecord, SegmentGuard, Storable, StoreError, TypedStore};
use gvault_types::{Basis, Entity, Kind, KindFamily, ObjectIdentity, ObjectRef, TopologyRecord};

use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, ArchiveResult};

pub const CONFIG_FILE: &str = "archive.toml";
pub const MANIFEST_FILE: &str = "manifest.gvm";
pub const PAYLOAD_DIR: &str = "payload";

/// What rebuilding the manifest from payload segments found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub summary: RebuildSummary,
    /// Records the scan skipped, per family.
    pub corrupt: Vec<(KindFamily, CorruptRecord)>,
    /// Families whose segment ended in a torn record, and where it was cut.
    pub truncated: Vec<(KindFamily, u64)>,
}

/// A content-addressed archive of B-Rep geometry rooted at one directory.
///
/// Every operation other than construction fails with
/// [`ArchiveError::NotOpen`] once [`close`](Self::close) has run. Operations
/// hold a shared lock on the open state for their whole duration, so `close`
/// waits for in-flight calls.
///
/// One process at a time: concurrent access from several processes must be
/// coordinated by the caller.
pub struct Archive {
    state: RwLock<Option<Inner>>,
}

/// The open state: configuration, catalog and one store per family.
pub(crate) struct Inner {
    pub(crate) root: PathBuf,
    pub(crate) config: ArchiveConfig,
    pub(crate) manifest: Arc<Manifest>,
    /// Geometry stores indexed by `KindFamily::index`.
    pub(crate) geometry: Vec<TypedStore<Entity>>,
    pub(crate) topology: TypedStore<TopologyRecord>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SegmentMode {
    Create,
    Open,
    OpenOrCreate,
}

impl Archive {
    /// Create a new archive at `root` with the default configuration.
    pub fn create(root: impl AsRef<Path>) -> ArchiveResult<Self> {
        Self::create_with_config(root, ArchiveConfig::default())
    }

    pub fn create_with_config(
        root: impl AsRef<Path>,
        config: ArchiveConfig,
    ) -> ArchiveResult<Self> {
        let root = root.as_ref().to_path_buf();
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(ArchiveError::AlreadyExists(root));
        }
        config.hasher()?;
        fs::create_dir_all(root.join(PAYLOAD_DIR))?;
        config.save(&config_path)?;

        let manifest = Arc::new(Manifest::empty(&root.join(MANIFEST_FILE)));
        let inner = Inner::assemble(root, config, manifest, SegmentMode::Create)?;
        inner.flush()?;
        info!(root = %inner.root.display(), "archive created");
        Ok(Self::from_inner(inner))
    }

    /// Open an existing archive. Fails with `ManifestInconsistent` if any
    /// segment's length differs from what the manifest last recorded.
    pub fn open(root: impl AsRef<Path>) -> ArchiveResult<Self> {
        let root = root.as_ref().to_path_buf();
        let config = ArchiveConfig::load(&root.join(CONFIG_FILE))?;
        let manifest = Arc::new(Manifest::load(&root.join(MANIFEST_FILE))?);
        let inner = Inner::assemble(root, config, manifest, SegmentMode::Open)?;
        inner.check_watermarks()?;
        info!(
            root = %inner.root.display(),
            objects = inner.manifest.len(),
            "archive opened"
        );
        Ok(Self::from_inner(inner))
    }

    /// Open an archive without trusting its manifest: rebuild the catalog
    /// from the payload segments and persist it.
    pub fn recover(root: impl AsRef<Path>) -> ArchiveResult<(Self, RecoveryReport)> {
        let root = root.as_ref().to_path_buf();
        let config = ArchiveConfig::load(&root.join(CONFIG_FILE))?;
        fs::create_dir_all(root.join(PAYLOAD_DIR))?;
        let manifest = Arc::new(Manifest::empty(&root.join(MANIFEST_FILE)));
        let inner = Inner::assemble(root, config, manifest, SegmentMode::OpenOrCreate)?;
        let report = inner.rebuild()?;
        info!(root = %inner.root.display(), "archive recovered");
        Ok((Self::from_inner(inner), report))
    }

    fn from_inner(inner: Inner) -> Self {
        Self {
            state: RwLock::new(Some(inner)),
        }
    }

    /// Flush everything and release the archive.
    pub fn close(&self) -> ArchiveResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        let inner = state.as_ref().ok_or(ArchiveError::NotOpen)?;
        inner.flush()?;
        info!(root = %inner.root.display(), "archive closed");
        *state = None;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.read().expect("lock poisoned").is_some()
    }

    /// Run `f` against the open state, holding it open until `f` returns.
    pub(crate) fn with_open<R>(
        &self,
        f: impl FnOnce(&Inner) -> ArchiveResult<R>,
    ) -> ArchiveResult<R> {
        let state = self.state.read().expect("lock poisoned");
        let inner = state.as_ref().ok_or(ArchiveError::NotOpen)?;
        f(inner)
    }

    pub fn root(&self) -> ArchiveResult<PathBuf> {
        self.with_open(|inner| Ok(inner.root.clone()))
    }

    pub fn config(&self) -> ArchiveResult<ArchiveConfig> {
        self.with_open(|inner| Ok(inner.config.clone()))
    }

    /// Durability point: sync every segment and atomically replace the
    /// manifest. Earlier adds and removes may be lost on a crash until this
    /// (or `close`) returns.
    pub fn flush(&self) -> ArchiveResult<()> {
        self.with_open(|inner| inner.flush())
    }

    /// Store an entity, or take another reference on an equal one already
    /// stored.
    ///
    /// A composite entity's basis may be given inline; it is stored first
    /// and the composite is stored pointing at it.
    pub fn add(&self, entity: &Entity) -> ArchiveResult<ObjectRef> {
        self.with_open(|inner| inner.add(entity))
    }

    /// Load a stored entity exactly as stored; composite bases stay as
    /// references.
    pub fn get(&self, reference: &ObjectRef) -> ArchiveResult<Entity> {
        self.with_open(|inner| inner.get(reference.identity()))
    }

    /// Load a stored entity with every composite basis loaded inline.
    pub fn get_resolved(&self, reference: &ObjectRef) -> ArchiveResult<Entity> {
        self.with_open(|inner| inner.get_resolved(reference.identity()))
    }

    /// Drop one reference. Returns the remaining count; storage is reclaimed
    /// by [`compact`](Self::compact).
    pub fn remove(&self, reference: &ObjectRef) -> ArchiveResult<u64> {
        self.with_open(|inner| inner.release(reference.identity()))
    }

    pub fn contains(&self, identity: &ObjectIdentity) -> ArchiveResult<bool> {
        self.with_open(|inner| Ok(inner.manifest.contains(identity)))
    }

    pub fn reference_count(&self, identity: &ObjectIdentity) -> ArchiveResult<u64> {
        self.with_open(|inner| {
            inner
                .manifest
                .get(identity)
                .map(|entry| entry.ref_count)
                .ok_or_else(|| StoreError::NotFound(*identity).into())
        })
    }

    /// Snapshot of the catalog in identity order.
    pub fn entries(&self) -> ArchiveResult<Vec<ManifestEntry>> {
        self.with_open(|inner| Ok(inner.manifest.entries()))
    }

    /// Replace the catalog with one rebuilt from the payload segments.
    ///
    /// Runs exclusively: in-flight operations finish first and new ones wait.
    pub fn rebuild(&self) -> ArchiveResult<RecoveryReport> {
        let state = self.state.write().expect("lock poisoned");
        let inner = state.as_ref().ok_or(ArchiveError::NotOpen)?;
        inner.rebuild()
    }
}

impl Inner {
    fn assemble(
        root: PathBuf,
        config: ArchiveConfig,
        manifest: Arc<Manifest>,
        mode: SegmentMode,
    ) -> ArchiveResult<Self> {
        let dir = root.join(PAYLOAD_DIR);
        let geometry = KindFamily::ALL
            .into_iter()
            .filter(|family| *family != KindFamily::Topology)
            .map(|family| segment_store(&dir, family, &manifest, &config, mode))
            .collect::<ArchiveResult<Vec<_>>>()?;
        let topology = segment_store(&dir, KindFamily::Topology, &manifest, &config, mode)?;
        Ok(Self {
            root,
            config,
            manifest,
            geometry,
            topology,
        })
    }

    pub(crate) fn geometry_store(&self, kind: Kind) -> ArchiveResult<&TypedStore<Entity>> {
        self.geometry
            .get(kind.family().index())
            .filter(|store| store.family() == kind.family())
            .ok_or_else(|| {
                StoreError::UnsupportedKind {
                    kind,
                    family: kind.family(),
                }
                .into()
            })
    }

    pub(crate) fn segment_len(&self, family: KindFamily) -> u64 {
        match family {
            KindFamily::Topology => self.topology.segment_len(),
            other => self.geometry[other.index()].segment_len(),
        }
    }

    /// Lock every segment in family order.
    pub(crate) fn lock_all(
        &self,
    ) -> (Vec<SegmentGuard<'_, Entity>>, SegmentGuard<'_, TopologyRecord>) {
        let geometry = self.geometry.iter().map(|s| s.lock_exclusive()).collect();
        (geometry, self.topology.lock_exclusive())
    }

    pub(crate) fn flush(&self) -> ArchiveResult<()> {
        let fsync = self.config.sync_on_flush;
        let (mut geometry, mut topology) = self.lock_all();
        for guard in &mut geometry {
            let len = guard.sync(fsync)?;
            self.manifest.set_watermark(guard.family(), len);
        }
        let len = topology.sync(fsync)?;
        self.manifest.set_watermark(KindFamily::Topology, len);
        self.manifest.save()?;
        debug!(root = %self.root.display(), "archive flushed");
        Ok(())
    }

    fn check_watermarks(&self) -> ArchiveResult<()> {
        for family in KindFamily::ALL {
            let actual = self.segment_len(family);
            match self.manifest.watermark(family) {
                Some(recorded) if recorded == actual => {}
                Some(recorded) => {
                    return Err(ArchiveError::ManifestInconsistent(format!(
                        "{family} segment is {actual} bytes but the manifest recorded {recorded}"
                    )))
                }
                None => {
                    return Err(ArchiveError::ManifestInconsistent(format!(
                        "manifest has no length recorded for the {family} segment"
                    )))
                }
            }
        }
        Ok(())
    }

    pub(crate) fn rebuild(&self) -> ArchiveResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let mut records = Vec::new();
        for store in &self.geometry {
            scan_into(store, &mut records, &mut report)?;
        }
        scan_into(&self.topology, &mut records, &mut report)?;

        let (rebuilt, summary) = Manifest::rebuild(self.manifest.path(), records);
        self.manifest.replace(rebuilt);
        report.summary = summary;
        self.flush()?;
        Ok(report)
    }

    pub(crate) fn add(&self, entity: &Entity) -> ArchiveResult<ObjectRef> {
        let store = self.geometry_store(entity.kind())?;
        let (entity, basis) = self.resolve_basis(entity)?;
        let outcome = match store.put(&entity) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(basis) = basis {
                    self.release_surplus(&basis);
                }
                return Err(e.into());
            }
        };
        if !outcome.created {
            if let Some(basis) = basis {
                self.release_surplus(&basis);
            }
        }
        Ok(ObjectRef::new(outcome.identity))
    }

    /// Take the reference a composite holds on its basis, storing an inline
    /// basis first. Returns the entity as it will be stored.
    fn resolve_basis<'e>(
        &self,
        entity: &'e Entity,
    ) -> ArchiveResult<(Cow<'e, Entity>, Option<ObjectIdentity>)> {
        let kind = entity.kind();
        let Some(basis) = entity.basis() else {
            return Ok((Cow::Borrowed(entity), None));
        };
        if let Some(expected) = kind.basis_family() {
            if basis.family() != expected {
                return Err(ArchiveError::InvalidBasis {
                    kind,
                    expected,
                    actual: basis.family(),
                });
            }
        }

        match basis {
            Basis::Stored(reference) => {
                let identity = *reference.identity();
                self.acquire(&identity).map_err(|e| {
                    if e.is_not_found(&identity) {
                        ArchiveError::DanglingReference {
                            referrer: format!("{kind} basis"),
                            missing: identity,
                        }
                    } else {
                        e
                    }
                })?;
                Ok((Cow::Borrowed(entity), Some(identity)))
            }
            Basis::Inline(inner) => {
                let reference = self.add(inner)?;
                let mut owned = entity.clone();
                if let Some(slot) = owned.basis_mut() {
                    *slot = Basis::Stored(reference);
                }
                Ok((Cow::Owned(owned), Some(*reference.identity())))
            }
        }
    }

    pub(crate) fn get(&self, identity: &ObjectIdentity) -> ArchiveResult<Entity> {
        Ok(self.geometry_store(identity.kind())?.get(identity)?)
    }

    pub(crate) fn get_resolved(&self, identity: &ObjectIdentity) -> ArchiveResult<Entity> {
        let mut entity = self.get(identity)?;
        let Some(base) = entity.basis().and_then(Basis::as_stored).map(|r| *r.identity()) else {
            return Ok(entity);
        };
        let resolved = self.get_resolved(&base).map_err(|e| {
            if e.is_not_found(&base) {
                ArchiveError::DanglingReference {
                    referrer: identity.to_string(),
                    missing: base,
                }
            } else {
                e
            }
        })?;
        if let Some(slot) = entity.basis_mut() {
            *slot = Basis::inline(resolved);
        }
        Ok(entity)
    }

    pub(crate) fn acquire(&self, identity: &ObjectIdentity) -> ArchiveResult<u64> {
        Ok(self.geometry_store(identity.kind())?.acquire(identity)?)
    }

    pub(crate) fn release(&self, identity: &ObjectIdentity) -> ArchiveResult<u64> {
        Ok(self.geometry_store(identity.kind())?.release(identity)?)
    }

    /// Give back a reference that is no longer needed, either because the
    /// operation that took it failed or because a dedup hit made it surplus.
    /// A failure here is logged; the caller's outcome stands.
    pub(crate) fn release_surplus(&self, identity: &ObjectIdentity) {
        if let Err(e) = self.release(identity) {
            warn!(%identity, error = %e, "could not release surplus reference");
        }
    }
}

fn segment_store<T: Storable>(
    dir: &Path,
    family: KindFamily,
    manifest: &Arc<Manifest>,
    config: &ArchiveConfig,
    mode: SegmentMode,
) -> ArchiveResult<TypedStore<T>> {
    let hasher = config.hasher()?;
    let retry = config.retry_policy();
    let manifest = Arc::clone(manifest);
    let create = match mode {
        SegmentMode::Create => true,
        SegmentMode::Open => false,
        SegmentMode::OpenOrCreate => {
            let path = TypedStore::<T>::segment_path(dir, family);
            let missing = !path.exists();
            if missing {
                warn!(%family, path = %path.display(), "segment missing; creating an empty one");
            }
            missing
        }
    };
    let store = if create {
        TypedStore::create(dir, family, manifest, hasher, retry)?
    } else {
        TypedStore::open(dir, family, manifest, hasher, retry)?
    };
    Ok(store)
}

fn scan_into<T: Storable>(
    store: &TypedStore<T>,
    records: &mut Vec<gvault_manifest::ScannedRecord>,
    report: &mut RecoveryReport,
) -> ArchiveResult<()> {
    let family = store.family();
    let scan = store.scan()?;
    if let Some(at) = scan.truncated_at {
        store.lock_exclusive().truncate(at)?;
        report.truncated.push((family, at));
    }
    report
        .corrupt
        .extend(scan.corrupt.into_iter().map(|record| (family, record)));
    records.extend(scan.records);
    Ok(())
}
