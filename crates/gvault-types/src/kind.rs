use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The typed store a [`Kind`] belongs to.
///
/// Each family owns one payload segment and one critical section, so
/// insertions of different families never contend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KindFamily {
    Curve2d,
    Curve3d,
    Surface,
    Polygon,
    Triangulation,
    Topology,
}

impl KindFamily {
    /// Every family, in lock order.
    pub const ALL: [KindFamily; 6] = [
        Self::Curve2d,
        Self::Curve3d,
        Self::Surface,
        Self::Polygon,
        Self::Triangulation,
        Self::Topology,
    ];

    /// Stable lowercase name, also used as the payload file stem.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Curve2d => "curve2d",
            Self::Curve3d => "curve3d",
            Self::Surface => "surface",
            Self::Polygon => "polygon",
            Self::Triangulation => "triangulation",
            Self::Topology => "topology",
        }
    }

    /// Parse a family from its [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Position in [`ALL`](Self::ALL).
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for KindFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of parametric dimensions of the space an entity lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimensionality {
    /// Lives in a 2D parameter plane (pcurves, 2D polygons).
    Planar,
    /// Lives in 3D model space.
    Spatial,
}

impl Dimensionality {
    pub fn tag(&self) -> u8 {
        match self {
            Self::Planar => 2,
            Self::Spatial => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, TypeError> {
        match tag {
            2 => Ok(Self::Planar),
            3 => Ok(Self::Spatial),
            other => Err(TypeError::UnknownDimensionality(other)),
        }
    }
}

/// Closed category of a storable object.
///
/// The declaration order matches tag order so that the derived `Ord` is the
/// same as comparing tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Line2d,
    Circle2d,
    Ellipse2d,
    Hyperbola2d,
    Parabola2d,
    BezierCurve2d,
    BSplineCurve2d,
    TrimmedCurve2d,
    OffsetCurve2d,

    Line,
    Circle,
    Ellipse,
    Hyperbola,
    Parabola,
    BezierCurve,
    BSplineCurve,
    TrimmedCurve,
    OffsetCurve,

    Plane,
    CylindricalSurface,
    ConicalSurface,
    SphericalSurface,
    ToroidalSurface,
    BezierSurface,
    BSplineSurface,
    RectangularTrimmedSurface,
    OffsetSurface,
    SurfaceOfLinearExtrusion,
    SurfaceOfRevolution,

    Polygon2d,
    Polygon3d,
    PolygonOnTriangulation,

    Triangulation,

    TopologyRecord,
}

impl Kind {
    /// Every kind, in tag order.
    pub const ALL: [Kind; 34] = [
        Self::Line2d,
        Self::Circle2d,
        Self::Ellipse2d,
        Self::Hyperbola2d,
        Self::Parabola2d,
        Self::BezierCurve2d,
        Self::BSplineCurve2d,
        Self::TrimmedCurve2d,
        Self::OffsetCurve2d,
        Self::Line,
        Self::Circle,
        Self::Ellipse,
        Self::Hyperbola,
        Self::Parabola,
        Self::BezierCurve,
        Self::BSplineCurve,
        Self::TrimmedCurve,
        Self::OffsetCurve,
        Self::Plane,
        Self::CylindricalSurface,
        Self::ConicalSurface,
        Self::SphericalSurface,
        Self::ToroidalSurface,
        Self::BezierSurface,
        Self::BSplineSurface,
        Self::RectangularTrimmedSurface,
        Self::OffsetSurface,
        Self::SurfaceOfLinearExtrusion,
        Self::SurfaceOfRevolution,
        Self::Polygon2d,
        Self::Polygon3d,
        Self::PolygonOnTriangulation,
        Self::Triangulation,
        Self::TopologyRecord,
    ];

    /// Stable on-disk tag. The high nibble is the family.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Line2d => 0x10,
            Self::Circle2d => 0x11,
            Self::Ellipse2d => 0x12,
            Self::Hyperbola2d => 0x13,
            Self::Parabola2d => 0x14,
            Self::BezierCurve2d => 0x15,
            Self::BSplineCurve2d => 0x16,
            Self::TrimmedCurve2d => 0x17,
            Self::OffsetCurve2d => 0x18,

            Self::Line => 0x20,
            Self::Circle => 0x21,
            Self::Ellipse => 0x22,
            Self::Hyperbola => 0x23,
            Self::Parabola => 0x24,
            Self::BezierCurve => 0x25,
            Self::BSplineCurve => 0x26,
            Self::TrimmedCurve => 0x27,
            Self::OffsetCurve => 0x28,

            Self::Plane => 0x30,
            Self::CylindricalSurface => 0x31,
            Self::ConicalSurface => 0x32,
            Self::SphericalSurface => 0x33,
            Self::ToroidalSurface => 0x34,
            Self::BezierSurface => 0x35,
            Self::BSplineSurface => 0x36,
            Self::RectangularTrimmedSurface => 0x37,
            Self::OffsetSurface => 0x38,
            Self::SurfaceOfLinearExtrusion => 0x39,
            Self::SurfaceOfRevolution => 0x3a,

            Self::Polygon2d => 0x40,
            Self::Polygon3d => 0x41,
            Self::PolygonOnTriangulation => 0x42,

            Self::Triangulation => 0x50,

            Self::TopologyRecord => 0x60,
        }
    }

    /// Parse a kind from its on-disk tag.
    pub fn from_tag(tag: u8) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or(TypeError::UnknownKindTag(tag))
    }

    pub fn family(&self) -> KindFamily {
        match self.tag() >> 4 {
            0x1 => KindFamily::Curve2d,
            0x2 => KindFamily::Curve3d,
            0x3 => KindFamily::Surface,
            0x4 => KindFamily::Polygon,
            0x5 => KindFamily::Triangulation,
            _ => KindFamily::Topology,
        }
    }

    pub fn dimensionality(&self) -> Dimensionality {
        match self {
            Self::Polygon2d => Dimensionality::Planar,
            _ if self.family() == KindFamily::Curve2d => Dimensionality::Planar,
            _ => Dimensionality::Spatial,
        }
    }

    /// Whether this kind refers to another stored object.
    pub fn is_composite(&self) -> bool {
        self.basis_family().is_some()
    }

    /// The family a composite kind's basis must belong to.
    pub fn basis_family(&self) -> Option<KindFamily> {
        match self {
            Self::TrimmedCurve2d | Self::OffsetCurve2d => Some(KindFamily::Curve2d),
            Self::TrimmedCurve | Self::OffsetCurve => Some(KindFamily::Curve3d),
            Self::RectangularTrimmedSurface | Self::OffsetSurface => Some(KindFamily::Surface),
            Self::SurfaceOfLinearExtrusion | Self::SurfaceOfRevolution => {
                Some(KindFamily::Curve3d)
            }
            Self::PolygonOnTriangulation => Some(KindFamily::Triangulation),
            _ => None,
        }
    }

    /// Lowercase kebab-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Line2d => "line-2d",
            Self::Circle2d => "circle-2d",
            Self::Ellipse2d => "ellipse-2d",
            Self::Hyperbola2d => "hyperbola-2d",
            Self::Parabola2d => "parabola-2d",
            Self::BezierCurve2d => "bezier-curve-2d",
            Self::BSplineCurve2d => "bspline-curve-2d",
            Self::TrimmedCurve2d => "trimmed-curve-2d",
            Self::OffsetCurve2d => "offset-curve-2d",
            Self::Line => "line",
            Self::Circle => "circle",
            Self::Ellipse => "ellipse",
            Self::Hyperbola => "hyperbola",
            Self::Parabola => "parabola",
            Self::BezierCurve => "bezier-curve",
            Self::BSplineCurve => "bspline-curve",
            Self::TrimmedCurve => "trimmed-curve",
            Self::OffsetCurve => "offset-curve",
            Self::Plane => "plane",
            Self::CylindricalSurface => "cylindrical-surface",
            Self::ConicalSurface => "conical-surface",
            Self::SphericalSurface => "spherical-surface",
            Self::ToroidalSurface => "toroidal-surface",
            Self::BezierSurface => "bezier-surface",
            Self::BSplineSurface => "bspline-surface",
            Self::RectangularTrimmedSurface => "rectangular-trimmed-surface",
            Self::OffsetSurface => "offset-surface",
            Self::SurfaceOfLinearExtrusion => "surface-of-linear-extrusion",
            Self::SurfaceOfRevolution => "surface-of-revolution",
            Self::Polygon2d => "polygon-2d",
            Self::Polygon3d => "polygon-3d",
            Self::PolygonOnTriangulation => "polygon-on-triangulation",
            Self::Triangulation => "triangulation",
            Self::TopologyRecord => "topology-record",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
