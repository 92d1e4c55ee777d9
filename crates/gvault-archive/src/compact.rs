use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use gvault_manifest::ManifestEntry;
use gvault_store::{CancelToken, PreparedSegment};
use gvault_types::ObjectIdentity;

use crate::archive::{Archive, Inner};
use crate::error::ArchiveResult;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompactReport {
    /// Objects physically removed, cascades included.
    pub dropped: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Stopped by the cancel token before anything was swapped in.
    pub cancelled: bool,
}

impl CompactReport {
    fn tally(&mut self, prepared: &PreparedSegment) {
        self.dropped += prepared.dropped().len();
        self.bytes_before += prepared.bytes_before;
        self.bytes_after += prepared.bytes_after();
    }
}

impl Archive {
    /// Physically drop every object whose reference count is zero, release
    /// what those objects referred to, and rewrite each segment with one
    /// record per surviving object.
    ///
    /// All segments are locked for the duration. Replacement segments are
    /// written in full before any is swapped in; cancelling before that
    /// point leaves the archive untouched. References to surviving objects
    /// stay valid.
    pub fn compact(&self, cancel: &CancelToken) -> ArchiveResult<CompactReport> {
        self.with_open(|inner| inner.compact(cancel))
    }
}

impl Inner {
    fn compact(&self, cancel: &CancelToken) -> ArchiveResult<CompactReport> {
        let (mut geometry, mut topology) = self.lock_all();
        let (doomed, counts) = reclaimable(&self.manifest.entries());
        let cancelled = || CompactReport {
            cancelled: true,
            ..CompactReport::default()
        };

        let mut prepared = Vec::with_capacity(geometry.len());
        for guard in &geometry {
            match guard.prepare(&doomed, &counts, cancel)? {
                Some(segment) => prepared.push(segment),
                None => return Ok(cancelled()),
            }
        }
        let Some(prepared_topology) = topology.prepare(&doomed, &counts, cancel)? else {
            return Ok(cancelled());
        };

        let mut report = CompactReport::default();
        for (guard, segment) in geometry.iter_mut().zip(prepared) {
            report.tally(&segment);
            guard.commit(segment)?;
        }
        report.tally(&prepared_topology);
        topology.commit(prepared_topology)?;
        self.manifest.save()?;

        info!(
            dropped = report.dropped,
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "archive compacted"
        );
        Ok(report)
    }
}

/// Objects to drop, following zero counts through the references each
/// dropped object held, and the counts the survivors end up with.
fn reclaimable(
    entries: &[ManifestEntry],
) -> (HashSet<ObjectIdentity>, HashMap<ObjectIdentity, u64>) {
    let mut counts: HashMap<ObjectIdentity, u64> =
        entries.iter().map(|e| (e.identity, e.ref_count)).collect();
    let references: HashMap<ObjectIdentity, &[ObjectIdentity]> = entries
        .iter()
        .map(|e| (e.identity, e.references.as_slice()))
        .collect();

    let mut pending: Vec<ObjectIdentity> = entries
        .iter()
        .filter(|e| e.ref_count == 0)
        .map(|e| e.identity)
        .collect();
    let mut doomed = HashSet::new();
    while let Some(identity) = pending.pop() {
        if !doomed.insert(identity) {
            continue;
        }
        for referent in references.get(&identity).copied().unwrap_or_default() {
            if let Some(count) = counts.get_mut(referent) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        pending.push(*referent);
                    }
                }
            }
        }
    }

    counts.retain(|identity, _| !doomed.contains(identity));
    (doomed, counts)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use gvault_types::{Basis, Curve3d, Entity, Frame3d, Role, Surface};

    use super::*;
    use crate::topology::ShapeExtractor;

    fn circle(radius: f64) -> Entity {
        Curve3d::Circle {
            frame: Frame3d::at([0.0; 3]),
            radius,
        }
        .into()
    }

    fn plane(z: f64) -> Entity {
        Surface::Plane {
            frame: Frame3d::at([0.0, 0.0, z]),
        }
        .into()
    }

    struct Parts;

    impl ShapeExtractor for Parts {
        type Shape = Vec<Entity>;
        type Error = Infallible;

        fn extract(&self, shape: &Vec<Entity>) -> Result<Vec<(Role, Entity)>, Infallible> {
            Ok(shape
                .iter()
                .enumerate()
                .map(|(i, e)| (Role::new(format!("part {i}")), e.clone()))
                .collect())
        }
    }

    #[test]
    fn drops_unreferenced_and_keeps_live() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let gone = archive.add(&circle(1.0)).unwrap();
        let kept = archive.add(&circle(2.0)).unwrap();
        archive.remove(&gone).unwrap();

        let report = archive.compact(&CancelToken::new()).unwrap();
        assert_eq!(report.dropped, 1);
        assert!(report.bytes_after < report.bytes_before);
        assert!(!archive.contains(gone.identity()).unwrap());
        assert_eq!(archive.get(&kept).unwrap(), circle(2.0));

        archive.close().unwrap();
        let archive = Archive::open(dir.path()).unwrap();
        assert_eq!(archive.get(&kept).unwrap(), circle(2.0));
        assert_eq!(archive.entries().unwrap().len(), 1);
    }

    #[test]
    fn folds_deltas_into_counts() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let reference = archive.add(&circle(1.0)).unwrap();
        archive.add(&circle(1.0)).unwrap();
        archive.add(&circle(1.0)).unwrap();
        archive.remove(&reference).unwrap();

        let report = archive.compact(&CancelToken::new()).unwrap();
        assert_eq!(report.dropped, 0);
        assert!(report.bytes_after < report.bytes_before);
        assert_eq!(archive.reference_count(reference.identity()).unwrap(), 2);
        archive.close().unwrap();

        std::fs::remove_file(dir.path().join(crate::archive::MANIFEST_FILE)).unwrap();
        let (archive, report) = Archive::recover(dir.path()).unwrap();
        assert_eq!(report.summary.deltas, 0);
        assert_eq!(archive.reference_count(reference.identity()).unwrap(), 2);
    }

    #[test]
    fn dropping_a_composite_releases_its_basis() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let trimmed = archive
            .add(
                &Curve3d::Trimmed {
                    basis: Basis::inline(Curve3d::Circle {
                        frame: Frame3d::at([0.0; 3]),
                        radius: 1.0,
                    }),
                    first: 0.0,
                    last: 2.0,
                }
                .into(),
            )
            .unwrap();
        let shared = archive.add(&circle(3.0)).unwrap();
        let extrusion = archive
            .add(
                &Surface::LinearExtrusion {
                    basis: shared.into(),
                    direction: [0.0, 0.0, 1.0],
                }
                .into(),
            )
            .unwrap();

        archive.remove(&trimmed).unwrap();
        archive.remove(&extrusion).unwrap();
        let report = archive.compact(&CancelToken::new()).unwrap();

        // The trimmed curve, its private basis, and the extrusion.
        assert_eq!(report.dropped, 3);
        assert_eq!(archive.entries().unwrap().len(), 1);
        assert_eq!(archive.reference_count(shared.identity()).unwrap(), 1);
    }

    #[test]
    fn dropping_a_topology_record_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let first = archive
            .add_topology(&vec![plane(0.0), circle(1.0)], &Parts)
            .unwrap();
        let second = archive
            .add_topology(&vec![plane(0.0), circle(2.0)], &Parts)
            .unwrap();

        archive.remove_topology(&first).unwrap();
        let report = archive.compact(&CancelToken::new()).unwrap();
        assert_eq!(report.dropped, 2);

        let shared = archive.add(&plane(0.0)).unwrap();
        assert_eq!(archive.reference_count(shared.identity()).unwrap(), 2);
        assert_eq!(archive.topology_record(&second).unwrap().len(), 2);
        assert!(archive.topology_record(&first).is_err());
    }

    #[test]
    fn cancelled_compaction_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let gone = archive.add(&circle(1.0)).unwrap();
        archive.remove(&gone).unwrap();
        let before = archive.stats().unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = archive.compact(&cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.dropped, 0);
        assert_eq!(archive.stats().unwrap(), before);
        assert!(archive.contains(gone.identity()).unwrap());

        archive.close().unwrap();
        Archive::open(dir.path()).unwrap();
    }

    #[test]
    fn reclaimable_follows_chains() {
        use gvault_manifest::Locator;
        use gvault_types::{Digest, Kind};

        let id = |n: u8, kind| ObjectIdentity::new(kind, Digest::from_hash([n; 32]));
        let entry = |identity, ref_count, references| ManifestEntry {
            identity,
            locator: Locator { offset: 0, length: 0 },
            ref_count,
            created_at: 0,
            references,
        };
        let base = id(1, Kind::Circle);
        let trim = id(2, Kind::TrimmedCurve);
        let record = id(3, Kind::TopologyRecord);
        let other = id(4, Kind::Plane);
        let entries = vec![
            entry(base, 1, vec![]),
            entry(trim, 1, vec![base]),
            entry(record, 0, vec![trim, other]),
            entry(other, 2, vec![]),
        ];

        let (doomed, counts) = reclaimable(&entries);
        assert_eq!(doomed, HashSet::from([base, trim, record]));
        assert_eq!(counts, HashMap::from([(other, 1)]));
    }
}
