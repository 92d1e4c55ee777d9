use gvault_types::{Digest, Entity, Kind, ObjectIdentity, Param, TopologyRecord};

use crate::canonical::CanonicalBuffer;
use crate::error::HashResult;
use crate::quantize::Quantizer;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every hash computation, so a geometry
/// buffer and a topology buffer with identical bytes hash differently.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for geometric entities.
    pub const GEOMETRY: Self = Self {
        domain: "gvault-geometry-v1",
    };
    /// Hasher for topology records.
    pub const TOPOLOGY: Self = Self {
        domain: "gvault-topology-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Maps entities and topology records to their identities.
#[derive(Clone, Copy, Debug, Default)]
pub struct CanonicalHasher {
    quantizer: Quantizer,
}

impl CanonicalHasher {
    pub fn new(quantizer: Quantizer) -> Self {
        Self { quantizer }
    }

    /// Hasher for a recorded quantization version.
    pub fn for_version(version: u8) -> HashResult<Self> {
        Ok(Self::new(Quantizer::for_version(version)?))
    }

    pub fn quantizer(&self) -> Quantizer {
        self.quantizer
    }

    /// Canonical bytes of an entity. Composite bases must already be stored.
    pub fn canonical_bytes(&self, entity: &Entity) -> HashResult<Vec<u8>> {
        let mut buf = CanonicalBuffer::new(self.quantizer, entity.kind());
        buf.params(&entity.parameters()?);
        Ok(buf.into_bytes())
    }

    /// Identity of a geometric entity.
    pub fn identity_of(&self, entity: &Entity) -> HashResult<ObjectIdentity> {
        let bytes = self.canonical_bytes(entity)?;
        let digest = ContentHasher::GEOMETRY.hash(&bytes);
        Ok(ObjectIdentity::new(entity.kind(), digest))
    }

    /// Identity of a topology record: entry count, then each role followed by
    /// the identity it points at, in record order.
    pub fn topology_identity(&self, record: &TopologyRecord) -> ObjectIdentity {
        let mut buf = CanonicalBuffer::new(self.quantizer, Kind::TopologyRecord);
        buf.param(&Param::Count(record.len() as u64));
        for entry in record.entries() {
            buf.text(entry.role.as_str());
            buf.identity(entry.reference.identity());
        }
        let digest = ContentHasher::TOPOLOGY.hash(buf.as_bytes());
        ObjectIdentity::new(Kind::TopologyRecord, digest)
    }

    /// The entity's parameters after quantization, for tolerance comparisons.
    pub fn canonical_parameters(&self, entity: &Entity) -> HashResult<Vec<Param>> {
        Ok(self.quantizer.params(&entity.parameters()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvault_types::{
        BSplineCurve, BSplineSurface, Basis, BezierCurve, BezierSurface, Curve2d, Curve3d,
        Frame2d, Frame3d, ObjectRef, Polygon, Role, Surface, Triangulation, TypeError,
    };
    use proptest::prelude::*;
    use std::collections::HashSet;

    use crate::error::HashError;

    fn line(direction: [f64; 3]) -> Entity {
        Entity::from(Curve3d::Line {
            origin: [0.0, 0.0, 0.0],
            direction,
        })
    }

    fn stored(kind: Kind) -> Basis {
        Basis::Stored(ObjectRef::new(ObjectIdentity::new(
            kind,
            Digest::from_hash([9; 32]),
        )))
    }

    /// One entity per geometric kind.
    fn one_of_each() -> Vec<Entity> {
        let f2 = Frame2d::at([1.0, 2.0]);
        let f3 = Frame3d::at([1.0, 2.0, 3.0]);
        let bezier2 = BezierCurve {
            poles: vec![[0.0, 0.0], [1.0, 2.0], [3.0, 1.0]],
            weights: None,
        };
        let bspline2 = BSplineCurve {
            degree: 2,
            periodic: false,
            knots: vec![0.0, 1.0],
            multiplicities: vec![3, 3],
            poles: vec![[0.0, 0.0], [1.0, 2.0], [3.0, 1.0]],
            weights: None,
        };
        let bezier3 = BezierCurve {
            poles: vec![[0.0; 3], [1.0, 2.0, 0.0], [3.0, 1.0, 0.0]],
            weights: None,
        };
        let bspline3 = BSplineCurve {
            degree: 2,
            periodic: false,
            knots: vec![0.0, 1.0],
            multiplicities: vec![3, 3],
            poles: vec![[0.0; 3], [1.0, 2.0, 0.0], [3.0, 1.0, 0.0]],
            weights: None,
        };
        let patch = vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 1.0]];
        let triangulation = Triangulation {
            nodes: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            uv_nodes: None,
            triangles: vec![[0, 1, 2]],
            deflection: 0.01,
        };

        vec![
            Curve2d::Line {
                origin: [0.0, 0.0],
                direction: [1.0, 0.0],
            }
            .into(),
            Curve2d::Circle { frame: f2, radius: 1.0 }.into(),
            Curve2d::Ellipse {
                frame: f2,
                major_radius: 2.0,
                minor_radius: 1.0,
            }
            .into(),
            Curve2d::Hyperbola {
                frame: f2,
                major_radius: 2.0,
                minor_radius: 1.0,
            }
            .into(),
            Curve2d::Parabola { frame: f2, focal: 1.0 }.into(),
            Curve2d::Bezier(bezier2).into(),
            Curve2d::BSpline(bspline2).into(),
            Curve2d::Trimmed {
                basis: stored(Kind::Circle2d),
                first: 0.0,
                last: 1.0,
            }
            .into(),
            Curve2d::Offset {
                basis: stored(Kind::Circle2d),
                distance: 1.0,
            }
            .into(),
            line([1.0, 0.0, 0.0]),
            Curve3d::Circle { frame: f3, radius: 1.0 }.into(),
            Curve3d::Ellipse {
                frame: f3,
                major_radius: 2.0,
                minor_radius: 1.0,
            }
            .into(),
            Curve3d::Hyperbola {
                frame: f3,
                major_radius: 2.0,
                minor_radius: 1.0,
            }
            .into(),
            Curve3d::Parabola { frame: f3, focal: 1.0 }.into(),
            Curve3d::Bezier(bezier3).into(),
            Curve3d::BSpline(bspline3).into(),
            Curve3d::Trimmed {
                basis: stored(Kind::Circle),
                first: 0.0,
                last: 1.0,
            }
            .into(),
            Curve3d::Offset {
                basis: stored(Kind::Circle),
                distance: 1.0,
                direction: [0.0, 0.0, 1.0],
            }
            .into(),
            Surface::Plane { frame: f3 }.into(),
            Surface::Cylinder { frame: f3, radius: 1.0 }.into(),
            Surface::Cone {
                frame: f3,
                radius: 1.0,
                semi_angle: 0.5,
            }
            .into(),
            Surface::Sphere { frame: f3, radius: 1.0 }.into(),
            Surface::Torus {
                frame: f3,
                major_radius: 2.0,
                minor_radius: 1.0,
            }
            .into(),
            Surface::Bezier(BezierSurface {
                u_count: 2,
                v_count: 2,
                poles: patch.clone(),
                weights: None,
            })
            .into(),
            Surface::BSpline(BSplineSurface {
                u_degree: 1,
                v_degree: 1,
                u_periodic: false,
                v_periodic: false,
                u_knots: vec![0.0, 1.0],
                u_multiplicities: vec![2, 2],
                v_knots: vec![0.0, 1.0],
                v_multiplicities: vec![2, 2],
                u_count: 2,
                v_count: 2,
                poles: patch,
                weights: None,
            })
            .into(),
            Surface::RectangularTrimmed {
                basis: stored(Kind::Plane),
                u1: 0.0,
                u2: 1.0,
                v1: 0.0,
                v2: 1.0,
            }
            .into(),
            Surface::Offset {
                basis: stored(Kind::Plane),
                distance: 1.0,
            }
            .into(),
            Surface::LinearExtrusion {
                basis: stored(Kind::Circle),
                direction: [0.0, 0.0, 1.0],
            }
            .into(),
            Surface::Revolution {
                basis: stored(Kind::Circle),
                location: [0.0; 3],
                axis: [0.0, 0.0, 1.0],
            }
            .into(),
            Polygon::Polygon2d {
                nodes: vec![[0.0, 0.0], [1.0, 0.0]],
                deflection: 0.01,
            }
            .into(),
            Polygon::Polygon3d {
                nodes: vec![[0.0; 3], [1.0, 0.0, 0.0]],
                parameters: None,
                deflection: 0.01,
            }
            .into(),
            Polygon::OnTriangulation {
                triangulation: stored(Kind::Triangulation),
                node_indices: vec![0, 1],
                parameters: None,
                deflection: 0.01,
            }
            .into(),
            triangulation.into(),
        ]
    }

    #[test]
    fn line_hash_is_stable() {
        let hasher = CanonicalHasher::default();
        let a = hasher.identity_of(&line([1.0, 0.0, 0.0])).unwrap();
        let b = hasher.identity_of(&line([1.0, 0.0, 0.0])).unwrap();
        let c = hasher.identity_of(&line([0.0, 1.0, 0.0])).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.kind(), Kind::Line);
    }

    #[test]
    fn hash_absorbs_representation_noise() {
        let hasher = CanonicalHasher::default();
        let a = hasher.identity_of(&line([1.0, 0.0, 0.0])).unwrap();
        let b = hasher.identity_of(&line([1.0 + 1e-13, -0.0, 1e-14])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn every_kind_is_covered_and_distinct() {
        let hasher = CanonicalHasher::default();
        let entities = one_of_each();
        let kinds: HashSet<Kind> = entities.iter().map(Entity::kind).collect();
        assert_eq!(kinds.len(), Kind::ALL.len() - 1);

        let digests: HashSet<Digest> = entities
            .iter()
            .map(|e| *hasher.identity_of(e).unwrap().digest())
            .collect();
        assert_eq!(digests.len(), entities.len());
    }

    #[test]
    fn equal_layouts_of_different_kinds_do_not_collide() {
        let hasher = CanonicalHasher::default();
        let frame = Frame3d::at([0.0; 3]);
        let cylinder = hasher
            .identity_of(&Surface::Cylinder { frame, radius: 1.0 }.into())
            .unwrap();
        let sphere = hasher
            .identity_of(&Surface::Sphere { frame, radius: 1.0 }.into())
            .unwrap();
        assert_ne!(cylinder.digest(), sphere.digest());
    }

    #[test]
    fn composite_hash_depends_on_basis_identity() {
        let hasher = CanonicalHasher::default();
        let other = Basis::Stored(ObjectRef::new(ObjectIdentity::new(
            Kind::Circle,
            Digest::from_hash([8; 32]),
        )));
        let a = Entity::from(Curve3d::Trimmed {
            basis: stored(Kind::Circle),
            first: 0.0,
            last: 1.0,
        });
        let b = Entity::from(Curve3d::Trimmed {
            basis: other,
            first: 0.0,
            last: 1.0,
        });
        assert_ne!(
            hasher.identity_of(&a).unwrap(),
            hasher.identity_of(&b).unwrap()
        );
    }

    #[test]
    fn inline_basis_cannot_be_hashed() {
        let hasher = CanonicalHasher::default();
        let trimmed = Entity::from(Curve3d::Trimmed {
            basis: Basis::inline(line([1.0, 0.0, 0.0])),
            first: 0.0,
            last: 1.0,
        });
        assert_eq!(
            hasher.identity_of(&trimmed),
            Err(HashError::Type(TypeError::UnresolvedBasis {
                kind: Kind::TrimmedCurve
            }))
        );
    }

    #[test]
    fn topology_identity_depends_on_roles_and_order() {
        let hasher = CanonicalHasher::default();
        let frame = Frame3d::at([0.0; 3]);
        let plane: Entity = Surface::Plane { frame }.into();
        let circle: Entity = Curve3d::Circle { frame, radius: 1.0 }.into();
        let plane = ObjectRef::new(hasher.identity_of(&plane).unwrap());
        let circle = ObjectRef::new(hasher.identity_of(&circle).unwrap());

        let ab: TopologyRecord = [(Role::new("face"), plane), (Role::new("edge"), circle)]
            .into_iter()
            .collect();
        let ba: TopologyRecord = [(Role::new("edge"), circle), (Role::new("face"), plane)]
            .into_iter()
            .collect();
        let renamed: TopologyRecord = [(Role::new("face:1"), plane), (Role::new("edge"), circle)]
            .into_iter()
            .collect();

        let id = hasher.topology_identity(&ab);
        assert_eq!(id, hasher.topology_identity(&ab.clone()));
        assert_eq!(id.kind(), Kind::TopologyRecord);
        assert_ne!(id, hasher.topology_identity(&ba));
        assert_ne!(id, hasher.topology_identity(&renamed));
    }

    #[test]
    fn domains_separate() {
        let data = b"same bytes";
        assert_ne!(
            ContentHasher::GEOMETRY.hash(data),
            ContentHasher::TOPOLOGY.hash(data)
        );
        assert_eq!(ContentHasher::GEOMETRY.domain(), "gvault-geometry-v1");
    }

    #[test]
    fn unknown_quantization_version() {
        assert!(matches!(
            CanonicalHasher::for_version(0),
            Err(HashError::UnsupportedQuantization(0))
        ));
    }

    proptest! {
        #[test]
        fn prop_identity_is_deterministic(
            x in -1e6f64..1e6f64,
            y in -1e6f64..1e6f64,
            r in 1e-3f64..1e3f64,
        ) {
            let hasher = CanonicalHasher::default();
            let circle: Entity = Curve2d::Circle { frame: Frame2d::at([x, y]), radius: r }.into();
            let again = circle.clone();
            prop_assert_eq!(
                hasher.identity_of(&circle).unwrap(),
                hasher.identity_of(&again).unwrap()
            );
        }

        #[test]
        fn prop_distinct_radii_hash_apart(r in 1e-3f64..1e3f64) {
            let hasher = CanonicalHasher::default();
            let frame = Frame3d::at([0.0; 3]);
            let a: Entity = Surface::Sphere { frame, radius: r }.into();
            let b: Entity = Surface::Sphere { frame, radius: r * (1.0 + 1e-6) }.into();
            prop_assert_ne!(hasher.identity_of(&a).unwrap(), hasher.identity_of(&b).unwrap());
        }
    }
}
