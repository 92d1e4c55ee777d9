use serde::{Deserialize, Serialize};

use super::{Basis, Frame3d, ParamList, Point3};
use crate::error::TypeError;
use crate::kind::Kind;

/// Bezier patch with poles stored row-major (`u_count` rows of `v_count`).
///
/// Parameters: u count, v count, poles, optional weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BezierSurface {
    pub u_count: u32,
    pub v_count: u32,
    pub poles: Vec<Point3>,
    pub weights: Option<Vec<f64>>,
}

/// B-spline surface with poles stored row-major.
///
/// Parameters: u degree, v degree, u periodic, v periodic, u knots, u
/// multiplicities, v knots, v multiplicities, u count, v count, poles,
/// optional weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BSplineSurface {
    pub u_degree: u32,
    pub v_degree: u32,
    pub u_periodic: bool,
    pub v_periodic: bool,
    pub u_knots: Vec<f64>,
    pub u_multiplicities: Vec<u32>,
    pub v_knots: Vec<f64>,
    pub v_multiplicities: Vec<u32>,
    pub u_count: u32,
    pub v_count: u32,
    pub poles: Vec<Point3>,
    pub weights: Option<Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    /// frame
    Plane { frame: Frame3d },
    /// frame, radius
    Cylinder { frame: Frame3d, radius: f64 },
    /// frame, reference radius, semi-angle
    Cone {
        frame: Frame3d,
        radius: f64,
        semi_angle: f64,
    },
    /// frame, radius
    Sphere { frame: Frame3d, radius: f64 },
    /// frame, major radius, minor radius
    Torus {
        frame: Frame3d,
        major_radius: f64,
        minor_radius: f64,
    },
    Bezier(BezierSurface),
    BSpline(BSplineSurface),
    /// basis, u1, u2, v1, v2
    RectangularTrimmed {
        basis: Basis,
        u1: f64,
        u2: f64,
        v1: f64,
        v2: f64,
    },
    /// basis, distance
    Offset { basis: Basis, distance: f64 },
    /// basis curve, extrusion direction
    LinearExtrusion { basis: Basis, direction: Point3 },
    /// basis curve, axis location, axis direction
    Revolution {
        basis: Basis,
        location: Point3,
        axis: Point3,
    },
}

impl Surface {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Plane { .. } => Kind::Plane,
            Self::Cylinder { .. } => Kind::CylindricalSurface,
            Self::Cone { .. } => Kind::ConicalSurface,
            Self::Sphere { .. } => Kind::SphericalSurface,
            Self::Torus { .. } => Kind::ToroidalSurface,
            Self::Bezier(_) => Kind::BezierSurface,
            Self::BSpline(_) => Kind::BSplineSurface,
            Self::RectangularTrimmed { .. } => Kind::RectangularTrimmedSurface,
            Self::Offset { .. } => Kind::OffsetSurface,
            Self::LinearExtrusion { .. } => Kind::SurfaceOfLinearExtrusion,
            Self::Revolution { .. } => Kind::SurfaceOfRevolution,
        }
    }

    pub fn basis(&self) -> Option<&Basis> {
        match self {
            Self::RectangularTrimmed { basis, .. }
            | Self::Offset { basis, .. }
            | Self::LinearExtrusion { basis, .. }
            | Self::Revolution { basis, .. } => Some(basis),
            _ => None,
        }
    }

    pub fn basis_mut(&mut self) -> Option<&mut Basis> {
        match self {
            Self::RectangularTrimmed { basis, .. }
            | Self::Offset { basis, .. }
            | Self::LinearExtrusion { basis, .. }
            | Self::Revolution { basis, .. } => Some(basis),
            _ => None,
        }
    }

    pub(crate) fn parameters(&self, out: &mut ParamList) -> Result<(), TypeError> {
        let kind = self.kind();
        match self {
            Self::Plane { frame } => {
                out.frame3d(frame);
            }
            Self::Cylinder { frame, radius } | Self::Sphere { frame, radius } => {
                out.frame3d(frame).real(*radius);
            }
            Self::Cone {
                frame,
                radius,
                semi_angle,
            } => {
                out.frame3d(frame).real(*radius).real(*semi_angle);
            }
            Self::Torus {
                frame,
                major_radius,
                minor_radius,
            } => {
                out.frame3d(frame).real(*major_radius).real(*minor_radius);
            }
            Self::Bezier(s) => {
                out.count(s.u_count as usize)
                    .count(s.v_count as usize)
                    .points(&s.poles)
                    .optional_reals(s.weights.as_deref());
            }
            Self::BSpline(s) => {
                out.count(s.u_degree as usize)
                    .count(s.v_degree as usize)
                    .flag(s.u_periodic)
                    .flag(s.v_periodic)
                    .reals(&s.u_knots)
                    .counts(&s.u_multiplicities)
                    .reals(&s.v_knots)
                    .counts(&s.v_multiplicities)
                    .count(s.u_count as usize)
                    .count(s.v_count as usize)
                    .points(&s.poles)
                    .optional_reals(s.weights.as_deref());
            }
            Self::RectangularTrimmed {
                basis,
                u1,
                u2,
                v1,
                v2,
            } => {
                out.basis(kind, basis)?
                    .real(*u1)
                    .real(*u2)
                    .real(*v1)
                    .real(*v2);
            }
            Self::Offset { basis, distance } => {
                out.basis(kind, basis)?.real(*distance);
            }
            Self::LinearExtrusion { basis, direction } => {
                out.basis(kind, basis)?.point(direction);
            }
            Self::Revolution {
                basis,
                location,
                axis,
            } => {
                out.basis(kind, basis)?.point(location).point(axis);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Param;

    fn params_of(surface: &Surface) -> Vec<Param> {
        let mut out = ParamList::default();
        surface.parameters(&mut out).unwrap();
        out.finish()
    }

    #[test]
    fn cylinder_and_sphere_differ_only_by_kind() {
        let frame = Frame3d::at([0.0; 3]);
        let cylinder = Surface::Cylinder { frame, radius: 2.0 };
        let sphere = Surface::Sphere { frame, radius: 2.0 };
        assert_eq!(params_of(&cylinder), params_of(&sphere));
        assert_eq!(cylinder.kind(), Kind::CylindricalSurface);
        assert_eq!(sphere.kind(), Kind::SphericalSurface);
    }

    #[test]
    fn plane_has_nine_reals() {
        let plane = Surface::Plane {
            frame: Frame3d::at([1.0, 2.0, 3.0]),
        };
        let params = params_of(&plane);
        assert_eq!(params.len(), 9);
        assert_eq!(params[0], Param::Real(1.0));
    }

    #[test]
    fn swept_surfaces_carry_a_basis() {
        let extrusion = Surface::LinearExtrusion {
            basis: Basis::inline(crate::geometry::Curve3d::Line {
                origin: [0.0; 3],
                direction: [1.0, 0.0, 0.0],
            }),
            direction: [0.0, 0.0, 1.0],
        };
        assert!(extrusion.basis().is_some());
        let mut out = ParamList::default();
        assert_eq!(
            extrusion.parameters(&mut out),
            Err(TypeError::UnresolvedBasis {
                kind: Kind::SurfaceOfLinearExtrusion
            })
        );
    }
}
