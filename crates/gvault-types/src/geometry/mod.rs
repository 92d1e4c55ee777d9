//! The geometric entity model.
//!
//! Entities are plain data handed over by the geometry kernel. Each one knows
//! its [`Kind`] and can list its defining parameters in a fixed order; the
//! archive never evaluates them.

mod curve;
mod mesh;
mod surface;

pub use curve::{BSplineCurve, BezierCurve, Curve2d, Curve3d};
pub use mesh::{Polygon, Triangulation};
pub use surface::{BSplineSurface, BezierSurface, Surface};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{ObjectIdentity, ObjectRef};
use crate::kind::{Dimensionality, Kind, KindFamily};

pub type Point2 = [f64; 2];
pub type Point3 = [f64; 3];

/// Placement in the plane: origin plus two axes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame2d {
    pub origin: Point2,
    pub x_dir: Point2,
    pub y_dir: Point2,
}

impl Frame2d {
    /// Frame at `origin` aligned with the coordinate axes.
    pub fn at(origin: Point2) -> Self {
        Self {
            origin,
            x_dir: [1.0, 0.0],
            y_dir: [0.0, 1.0],
        }
    }
}

/// Placement in space: origin, main axis (normal), reference x axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame3d {
    pub origin: Point3,
    pub normal: Point3,
    pub x_dir: Point3,
}

impl Frame3d {
    /// Frame at `origin` with normal +Z and x axis +X.
    pub fn at(origin: Point3) -> Self {
        Self {
            origin,
            normal: [0.0, 0.0, 1.0],
            x_dir: [1.0, 0.0, 0.0],
        }
    }
}

/// One item of an entity's canonical parameter sequence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Param {
    Real(f64),
    Count(u64),
    Flag(bool),
    /// Identity of a stored basis entity.
    Ref(ObjectIdentity),
}

/// The entity a composite kind is derived from.
///
/// `Inline` is accepted from callers and stored first; stored payloads only
/// ever carry `Stored`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Basis {
    Stored(ObjectRef),
    Inline(Box<Entity>),
}

impl Basis {
    pub fn inline(entity: impl Into<Entity>) -> Self {
        Self::Inline(Box::new(entity.into()))
    }

    pub fn as_stored(&self) -> Option<&ObjectRef> {
        match self {
            Self::Stored(r) => Some(r),
            Self::Inline(_) => None,
        }
    }

    /// Family of the referenced entity, whichever form it takes.
    pub fn family(&self) -> KindFamily {
        match self {
            Self::Stored(r) => r.kind().family(),
            Self::Inline(e) => e.family(),
        }
    }
}

impl From<ObjectRef> for Basis {
    fn from(r: ObjectRef) -> Self {
        Self::Stored(r)
    }
}

/// A geometric entity of any supported kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Curve2d(Curve2d),
    Curve3d(Curve3d),
    Surface(Surface),
    Polygon(Polygon),
    Triangulation(Triangulation),
}

impl Entity {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Curve2d(c) => c.kind(),
            Self::Curve3d(c) => c.kind(),
            Self::Surface(s) => s.kind(),
            Self::Polygon(p) => p.kind(),
            Self::Triangulation(_) => Kind::Triangulation,
        }
    }

    pub fn family(&self) -> KindFamily {
        self.kind().family()
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.kind().dimensionality()
    }

    /// The basis of a composite entity, `None` for primitives.
    pub fn basis(&self) -> Option<&Basis> {
        match self {
            Self::Curve2d(c) => c.basis(),
            Self::Curve3d(c) => c.basis(),
            Self::Surface(s) => s.basis(),
            Self::Polygon(p) => p.basis(),
            Self::Triangulation(_) => None,
        }
    }

    pub fn basis_mut(&mut self) -> Option<&mut Basis> {
        match self {
            Self::Curve2d(c) => c.basis_mut(),
            Self::Curve3d(c) => c.basis_mut(),
            Self::Surface(s) => s.basis_mut(),
            Self::Polygon(p) => p.basis_mut(),
            Self::Triangulation(_) => None,
        }
    }

    /// Identities of stored entities this one refers to.
    pub fn references(&self) -> Vec<ObjectIdentity> {
        self.basis()
            .and_then(Basis::as_stored)
            .map(|r| vec![*r.identity()])
            .unwrap_or_default()
    }

    /// The canonical parameter sequence, in the order documented on each kind.
    ///
    /// Fails with [`TypeError::UnresolvedBasis`] while a basis is still inline.
    pub fn parameters(&self) -> Result<Vec<Param>, TypeError> {
        let mut out = ParamList::default();
        match self {
            Self::Curve2d(c) => c.parameters(&mut out)?,
            Self::Curve3d(c) => c.parameters(&mut out)?,
            Self::Surface(s) => s.parameters(&mut out)?,
            Self::Polygon(p) => p.parameters(&mut out)?,
            Self::Triangulation(t) => t.parameters(&mut out),
        }
        Ok(out.finish())
    }
}

impl From<Curve2d> for Entity {
    fn from(c: Curve2d) -> Self {
        Self::Curve2d(c)
    }
}

impl From<Curve3d> for Entity {
    fn from(c: Curve3d) -> Self {
        Self::Curve3d(c)
    }
}

impl From<Surface> for Entity {
    fn from(s: Surface) -> Self {
        Self::Surface(s)
    }
}

impl From<Polygon> for Entity {
    fn from(p: Polygon) -> Self {
        Self::Polygon(p)
    }
}

impl From<Triangulation> for Entity {
    fn from(t: Triangulation) -> Self {
        Self::Triangulation(t)
    }
}

/// Accumulates a canonical parameter sequence.
#[derive(Default)]
pub(crate) struct ParamList {
    items: Vec<Param>,
}

impl ParamList {
    pub(crate) fn real(&mut self, value: f64) -> &mut Self {
        self.items.push(Param::Real(value));
        self
    }

    pub(crate) fn count(&mut self, n: usize) -> &mut Self {
        self.items.push(Param::Count(n as u64));
        self
    }

    pub(crate) fn flag(&mut self, value: bool) -> &mut Self {
        self.items.push(Param::Flag(value));
        self
    }

    pub(crate) fn point<P: AsRef<[f64]>>(&mut self, p: &P) -> &mut Self {
        for &c in p.as_ref() {
            self.real(c);
        }
        self
    }

    /// Length-prefixed list of points.
    pub(crate) fn points<P: AsRef<[f64]>>(&mut self, ps: &[P]) -> &mut Self {
        self.count(ps.len());
        for p in ps {
            self.point(p);
        }
        self
    }

    /// Length-prefixed list of reals.
    pub(crate) fn reals(&mut self, values: &[f64]) -> &mut Self {
        self.count(values.len());
        for &v in values {
            self.real(v);
        }
        self
    }

    /// Length-prefixed list of integers.
    pub(crate) fn counts(&mut self, values: &[u32]) -> &mut Self {
        self.count(values.len());
        for &v in values {
            self.count(v as usize);
        }
        self
    }

    /// Presence flag, then the list if present.
    pub(crate) fn optional_reals(&mut self, values: Option<&[f64]>) -> &mut Self {
        match values {
            Some(v) => self.flag(true).reals(v),
            None => self.flag(false),
        }
    }

    pub(crate) fn frame2d(&mut self, f: &Frame2d) -> &mut Self {
        self.point(&f.origin).point(&f.x_dir).point(&f.y_dir)
    }

    pub(crate) fn frame3d(&mut self, f: &Frame3d) -> &mut Self {
        self.point(&f.origin).point(&f.normal).point(&f.x_dir)
    }

    pub(crate) fn basis(&mut self, kind: Kind, basis: &Basis) -> Result<&mut Self, TypeError> {
        match basis {
            Basis::Stored(r) => {
                self.items.push(Param::Ref(*r.identity()));
                Ok(self)
            }
            Basis::Inline(_) => Err(TypeError::UnresolvedBasis { kind }),
        }
    }

    pub(crate) fn finish(self) -> Vec<Param> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    fn stored(kind: Kind) -> Basis {
        Basis::Stored(ObjectRef::new(ObjectIdentity::new(
            kind,
            Digest::from_hash([4; 32]),
        )))
    }

    #[test]
    fn line_parameters_are_origin_then_direction() {
        let line = Entity::from(Curve3d::Line {
            origin: [1.0, 2.0, 3.0],
            direction: [0.0, 0.0, 1.0],
        });
        let params = line.parameters().unwrap();
        let reals: Vec<f64> = params
            .iter()
            .map(|p| match p {
                Param::Real(v) => *v,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(reals, vec![1.0, 2.0, 3.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn stored_basis_appears_as_ref() {
        let basis = stored(Kind::Circle);
        let trimmed = Entity::from(Curve3d::Trimmed {
            basis: basis.clone(),
            first: 0.0,
            last: 1.5,
        });
        let params = trimmed.parameters().unwrap();
        assert_eq!(params[0], Param::Ref(*basis.as_stored().unwrap().identity()));
        assert_eq!(trimmed.references().len(), 1);
    }

    #[test]
    fn inline_basis_is_unresolved() {
        let trimmed = Entity::from(Curve3d::Trimmed {
            basis: Basis::inline(Curve3d::Line {
                origin: [0.0; 3],
                direction: [1.0, 0.0, 0.0],
            }),
            first: 0.0,
            last: 1.0,
        });
        assert_eq!(
            trimmed.parameters(),
            Err(TypeError::UnresolvedBasis {
                kind: Kind::TrimmedCurve
            })
        );
        assert!(trimmed.references().is_empty());
        assert_eq!(trimmed.basis().unwrap().family(), KindFamily::Curve3d);
    }

    #[test]
    fn optional_lists_are_flagged() {
        let without = Entity::from(Curve2d::Bezier(BezierCurve {
            poles: vec![[0.0, 0.0], [1.0, 1.0]],
            weights: None,
        }));
        let with = Entity::from(Curve2d::Bezier(BezierCurve {
            poles: vec![[0.0, 0.0], [1.0, 1.0]],
            weights: Some(vec![1.0, 1.0]),
        }));
        assert_ne!(without.parameters().unwrap(), with.parameters().unwrap());
    }

    #[test]
    fn primitives_have_no_basis() {
        let plane = Entity::from(Surface::Plane {
            frame: Frame3d::at([0.0; 3]),
        });
        assert!(plane.basis().is_none());
        assert_eq!(plane.kind(), Kind::Plane);
        assert_eq!(plane.dimensionality(), Dimensionality::Spatial);
    }

    #[test]
    fn bincode_roundtrip_keeps_basis_form() {
        let entity = Entity::from(Surface::Offset {
            basis: stored(Kind::CylindricalSurface),
            distance: 0.25,
        });
        let bytes = bincode::serialize(&entity).unwrap();
        let back: Entity = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, entity);
    }
}
