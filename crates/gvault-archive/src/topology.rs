//! Shapes as sets of role-labelled references into the geometry stores.
//!
//! The archive never looks inside a shape. A [`ShapeExtractor`] supplied by
//! the geometry kernel breaks a shape into `(role, entity)` pairs on the way
//! in, and a [`ShapeReconstructor`] reassembles them on the way out.

use std::fmt::Display;

use tracing::debug;

use gvault_store::StoreError;
use gvault_types::{Entity, KindFamily, ObjectRef, Role, TopologyRecord, TopologyRef};

use crate::archive::{Archive, Inner};
use crate::error::{ArchiveError, ArchiveResult};

/// Breaks a kernel shape into the geometry it is built from.
pub trait ShapeExtractor {
    type Shape;
    type Error: Display;

    fn extract(&self, shape: &Self::Shape) -> Result<Vec<(Role, Entity)>, Self::Error>;
}

/// Builds a kernel shape back from its geometry, in record order.
pub trait ShapeReconstructor {
    type Shape;
    type Error: Display;

    fn reconstruct(&self, parts: Vec<(Role, Entity)>) -> Result<Self::Shape, Self::Error>;
}

impl Archive {
    /// Store every entity the extractor finds in `shape` and a topology
    /// record pointing at them.
    pub fn add_topology<X: ShapeExtractor>(
        &self,
        shape: &X::Shape,
        extractor: &X,
    ) -> ArchiveResult<TopologyRef> {
        let parts = extractor
            .extract(shape)
            .map_err(|e| ArchiveError::Kernel(e.to_string()))?;
        self.with_open(|inner| inner.add_topology(parts))
    }

    /// Store a record built from references the caller already holds. The
    /// record takes its own reference on each entry.
    pub fn add_topology_record(&self, record: &TopologyRecord) -> ArchiveResult<TopologyRef> {
        self.with_open(|inner| {
            let mut acquired = Vec::with_capacity(record.len());
            for entry in record.entries() {
                let identity = *entry.reference.identity();
                if let Err(e) = inner.acquire(&identity) {
                    inner.release_all(&acquired);
                    return Err(if e.is_not_found(&identity) {
                        ArchiveError::DanglingReference {
                            referrer: format!("topology role {}", entry.role),
                            missing: identity,
                        }
                    } else {
                        e
                    });
                }
                acquired.push(entry.reference);
            }
            inner.store_record(record, &acquired)
        })
    }

    /// Load a topology record and hand its resolved geometry to the
    /// reconstructor.
    pub fn get_topology<R: ShapeReconstructor>(
        &self,
        reference: &TopologyRef,
        reconstructor: &R,
    ) -> ArchiveResult<R::Shape> {
        let parts = self.with_open(|inner| inner.resolve_topology(reference))?;
        reconstructor
            .reconstruct(parts)
            .map_err(|e| ArchiveError::Kernel(e.to_string()))
    }

    /// The stored record itself, without resolving any entry.
    pub fn topology_record(&self, reference: &TopologyRef) -> ArchiveResult<TopologyRecord> {
        self.with_open(|inner| Ok(inner.topology.get(reference.identity())?))
    }

    /// Drop one reference on a topology record. Its entries are released when
    /// compaction reclaims it.
    pub fn remove_topology(&self, reference: &TopologyRef) -> ArchiveResult<u64> {
        self.with_open(|inner| Ok(inner.topology.release(reference.identity())?))
    }
}

impl Inner {
    fn add_topology(&self, parts: Vec<(Role, Entity)>) -> ArchiveResult<TopologyRef> {
        let mut record = TopologyRecord::new();
        let mut added = Vec::with_capacity(parts.len());
        for (role, entity) in parts {
            match self.add(&entity) {
                Ok(reference) => {
                    record.push(role, reference);
                    added.push(reference);
                }
                Err(e) => {
                    self.release_all(&added);
                    return Err(e);
                }
            }
        }
        self.store_record(&record, &added)
    }

    /// Put `record`, whose entries' references are already held in `held`.
    /// On a dedup hit the existing record already owns references on the
    /// same entries, so `held` is given back.
    fn store_record(
        &self,
        record: &TopologyRecord,
        held: &[ObjectRef],
    ) -> ArchiveResult<TopologyRef> {
        let outcome = match self.topology.put(record) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release_all(held);
                return Err(e.into());
            }
        };
        if !outcome.created {
            self.release_all(held);
        }
        debug!(
            identity = %outcome.identity,
            entries = record.len(),
            created = outcome.created,
            "topology stored"
        );
        TopologyRef::new(outcome.identity).ok_or_else(|| {
            StoreError::UnsupportedKind {
                kind: outcome.identity.kind(),
                family: KindFamily::Topology,
            }
            .into()
        })
    }

    fn resolve_topology(&self, reference: &TopologyRef) -> ArchiveResult<Vec<(Role, Entity)>> {
        let record = self.topology.get(reference.identity())?;
        record
            .entries()
            .iter()
            .map(|entry| {
                let identity = entry.reference.identity();
                match self.get_resolved(identity) {
                    Ok(entity) => Ok((entry.role.clone(), entity)),
                    Err(e) if e.is_not_found(identity) => Err(ArchiveError::DanglingReference {
                        referrer: format!("{reference} role {}", entry.role),
                        missing: *identity,
                    }),
                    Err(e) => Err(e),
                }
            })
            .collect()
    }

    fn release_all(&self, held: &[ObjectRef]) {
        for reference in held {
            self.release_surplus(reference.identity());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use gvault_types::{Curve3d, Frame3d, Surface};

    use super::*;

    /// A face: one surface and its boundary edges.
    struct Face {
        surface: Entity,
        edges: Vec<Entity>,
    }

    struct FaceKernel;

    impl ShapeExtractor for FaceKernel {
        type Shape = Face;
        type Error = Infallible;

        fn extract(&self, face: &Face) -> Result<Vec<(Role, Entity)>, Infallible> {
            let mut parts = vec![(Role::from("surface"), face.surface.clone())];
            for (i, edge) in face.edges.iter().enumerate() {
                parts.push((Role::new(format!("edge {i}")), edge.clone()));
            }
            Ok(parts)
        }
    }

    impl ShapeReconstructor for FaceKernel {
        type Shape = Face;
        type Error = String;

        fn reconstruct(&self, parts: Vec<(Role, Entity)>) -> Result<Face, String> {
            let mut parts = parts.into_iter();
            let (role, surface) = parts.next().ok_or("empty face")?;
            if role.as_str() != "surface" {
                return Err(format!("expected a surface first, got {role}"));
            }
            Ok(Face {
                surface,
                edges: parts.map(|(_, edge)| edge).collect(),
            })
        }
    }

    struct FailingKernel;

    impl ShapeExtractor for FailingKernel {
        type Shape = Face;
        type Error = &'static str;

        fn extract(&self, _: &Face) -> Result<Vec<(Role, Entity)>, &'static str> {
            Err("shape is not closed")
        }
    }

    fn cylinder() -> Entity {
        Surface::Cylinder {
            frame: Frame3d::at([0.0; 3]),
            radius: 2.0,
        }
        .into()
    }

    fn edge(z: f64) -> Entity {
        Curve3d::Circle {
            frame: Frame3d::at([0.0, 0.0, z]),
            radius: 2.0,
        }
        .into()
    }

    fn face(edges: &[f64]) -> Face {
        Face {
            surface: cylinder(),
            edges: edges.iter().map(|z| edge(*z)).collect(),
        }
    }

    #[test]
    fn shared_surface_is_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();

        let a = archive.add_topology(&face(&[0.0, 1.0]), &FaceKernel).unwrap();
        let b = archive.add_topology(&face(&[1.0, 2.0]), &FaceKernel).unwrap();
        assert_ne!(a, b);

        let surfaces: Vec<_> = archive
            .entries()
            .unwrap()
            .into_iter()
            .filter(|e| e.kind() == cylinder().kind())
            .collect();
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0].ref_count, 2);

        let shared_edge = archive.add(&edge(1.0)).unwrap();
        assert_eq!(archive.reference_count(shared_edge.identity()).unwrap(), 3);
    }

    #[test]
    fn topology_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let reference = archive.add_topology(&face(&[0.0, 3.0]), &FaceKernel).unwrap();

        let back = archive.get_topology(&reference, &FaceKernel).unwrap();
        assert_eq!(back.surface, cylinder());
        assert_eq!(back.edges, vec![edge(0.0), edge(3.0)]);

        let record = archive.topology_record(&reference).unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record.entries()[0].role.as_str(), "surface");
    }

    #[test]
    fn same_shape_twice_holds_one_reference_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let a = archive.add_topology(&face(&[0.0]), &FaceKernel).unwrap();
        let b = archive.add_topology(&face(&[0.0]), &FaceKernel).unwrap();
        assert_eq!(a, b);
        assert_eq!(archive.reference_count(a.identity()).unwrap(), 2);

        let surface = archive.add(&cylinder()).unwrap();
        assert_eq!(archive.reference_count(surface.identity()).unwrap(), 2);
    }

    #[test]
    fn record_from_held_references() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let surface = archive.add(&cylinder()).unwrap();

        let mut record = TopologyRecord::new();
        record.push("surface", surface);
        let reference = archive.add_topology_record(&record).unwrap();
        assert_eq!(archive.reference_count(surface.identity()).unwrap(), 2);
        assert_eq!(archive.topology_record(&reference).unwrap(), record);

        let other = tempfile::tempdir().unwrap();
        let foreign = Archive::create(other.path()).unwrap().add(&edge(5.0)).unwrap();
        record.push("edge 0", foreign);
        assert!(matches!(
            archive.add_topology_record(&record),
            Err(ArchiveError::DanglingReference { missing, .. }) if missing == *foreign.identity()
        ));
        // The surface reference taken before the failure was given back.
        assert_eq!(archive.reference_count(surface.identity()).unwrap(), 2);
    }

    #[test]
    fn kernel_errors_surface_as_kernel() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let err = archive
            .add_topology(&face(&[0.0]), &FailingKernel)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Kernel(msg) if msg == "shape is not closed"));
        assert!(archive.entries().unwrap().is_empty());
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path()).unwrap();
        let other = tempfile::tempdir().unwrap();
        let foreign = Archive::create(other.path())
            .unwrap()
            .add_topology(&face(&[0.0]), &FaceKernel)
            .unwrap();
        assert!(matches!(
            archive.get_topology(&foreign, &FaceKernel),
            Err(ArchiveError::Store(StoreError::NotFound(_)))
        ));
    }
}
