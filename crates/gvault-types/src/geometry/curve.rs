use serde::{Deserialize, Serialize};

use super::{Basis, Frame2d, Frame3d, ParamList, Point2, Point3};
use crate::error::TypeError;
use crate::kind::Kind;

/// Rational or polynomial Bezier curve.
///
/// Parameters: poles (count, then coordinates), then optional weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BezierCurve<P> {
    pub poles: Vec<P>,
    pub weights: Option<Vec<f64>>,
}

impl<P: AsRef<[f64]>> BezierCurve<P> {
    fn parameters(&self, out: &mut ParamList) {
        out.points(&self.poles).optional_reals(self.weights.as_deref());
    }
}

/// B-spline curve in parametrization order.
///
/// Parameters: degree, periodic flag, knots, multiplicities, poles, then
/// optional weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BSplineCurve<P> {
    pub degree: u32,
    pub periodic: bool,
    pub knots: Vec<f64>,
    pub multiplicities: Vec<u32>,
    pub poles: Vec<P>,
    pub weights: Option<Vec<f64>>,
}

impl<P: AsRef<[f64]>> BSplineCurve<P> {
    fn parameters(&self, out: &mut ParamList) {
        out.count(self.degree as usize)
            .flag(self.periodic)
            .reals(&self.knots)
            .counts(&self.multiplicities)
            .points(&self.poles)
            .optional_reals(self.weights.as_deref());
    }
}

/// Curve in a surface's parameter plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Curve2d {
    /// origin, direction
    Line { origin: Point2, direction: Point2 },
    /// frame, radius
    Circle { frame: Frame2d, radius: f64 },
    /// frame, major radius, minor radius
    Ellipse {
        frame: Frame2d,
        major_radius: f64,
        minor_radius: f64,
    },
    /// frame, major radius, minor radius
    Hyperbola {
        frame: Frame2d,
        major_radius: f64,
        minor_radius: f64,
    },
    /// frame, focal distance
    Parabola { frame: Frame2d, focal: f64 },
    Bezier(BezierCurve<Point2>),
    BSpline(BSplineCurve<Point2>),
    /// basis, first, last
    Trimmed { basis: Basis, first: f64, last: f64 },
    /// basis, distance
    Offset { basis: Basis, distance: f64 },
}

impl Curve2d {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Line { .. } => Kind::Line2d,
            Self::Circle { .. } => Kind::Circle2d,
            Self::Ellipse { .. } => Kind::Ellipse2d,
            Self::Hyperbola { .. } => Kind::Hyperbola2d,
            Self::Parabola { .. } => Kind::Parabola2d,
            Self::Bezier(_) => Kind::BezierCurve2d,
            Self::BSpline(_) => Kind::BSplineCurve2d,
            Self::Trimmed { .. } => Kind::TrimmedCurve2d,
            Self::Offset { .. } => Kind::OffsetCurve2d,
        }
    }

    pub fn basis(&self) -> Option<&Basis> {
        match self {
            Self::Trimmed { basis, .. } | Self::Offset { basis, .. } => Some(basis),
            _ => None,
        }
    }

    pub fn basis_mut(&mut self) -> Option<&mut Basis> {
        match self {
            Self::Trimmed { basis, .. } | Self::Offset { basis, .. } => Some(basis),
            _ => None,
        }
    }

    pub(crate) fn parameters(&self, out: &mut ParamList) -> Result<(), TypeError> {
        match self {
            Self::Line { origin, direction } => {
                out.point(origin).point(direction);
            }
            Self::Circle { frame, radius } => {
                out.frame2d(frame).real(*radius);
            }
            Self::Ellipse {
                frame,
                major_radius,
                minor_radius,
            }
            | Self::Hyperbola {
                frame,
                major_radius,
                minor_radius,
            } => {
                out.frame2d(frame).real(*major_radius).real(*minor_radius);
            }
            Self::Parabola { frame, focal } => {
                out.frame2d(frame).real(*focal);
            }
            Self::Bezier(c) => c.parameters(out),
            Self::BSpline(c) => c.parameters(out),
            Self::Trimmed { basis, first, last } => {
                out.basis(self.kind(), basis)?.real(*first).real(*last);
            }
            Self::Offset { basis, distance } => {
                out.basis(self.kind(), basis)?.real(*distance);
            }
        }
        Ok(())
    }
}

/// Curve in model space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Curve3d {
    /// origin, direction
    Line { origin: Point3, direction: Point3 },
    /// frame, radius
    Circle { frame: Frame3d, radius: f64 },
    /// frame, major radius, minor radius
    Ellipse {
        frame: Frame3d,
        major_radius: f64,
        minor_radius: f64,
    },
    /// frame, major radius, minor radius
    Hyperbola {
        frame: Frame3d,
        major_radius: f64,
        minor_radius: f64,
    },
    /// frame, focal distance
    Parabola { frame: Frame3d, focal: f64 },
    Bezier(BezierCurve<Point3>),
    BSpline(BSplineCurve<Point3>),
    /// basis, first, last
    Trimmed { basis: Basis, first: f64, last: f64 },
    /// basis, distance, reference direction
    Offset {
        basis: Basis,
        distance: f64,
        direction: Point3,
    },
}

impl Curve3d {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Line { .. } => Kind::Line,
            Self::Circle { .. } => Kind::Circle,
            Self::Ellipse { .. } => Kind::Ellipse,
            Self::Hyperbola { .. } => Kind::Hyperbola,
            Self::Parabola { .. } => Kind::Parabola,
            Self::Bezier(_) => Kind::BezierCurve,
            Self::BSpline(_) => Kind::BSplineCurve,
            Self::Trimmed { .. } => Kind::TrimmedCurve,
            Self::Offset { .. } => Kind::OffsetCurve,
        }
    }

    pub fn basis(&self) -> Option<&Basis> {
        match self {
            Self::Trimmed { basis, .. } | Self::Offset { basis, .. } => Some(basis),
            _ => None,
        }
    }

    pub fn basis_mut(&mut self) -> Option<&mut Basis> {
        match self {
            Self::Trimmed { basis, .. } | Self::Offset { basis, .. } => Some(basis),
            _ => None,
        }
    }

    pub(crate) fn parameters(&self, out: &mut ParamList) -> Result<(), TypeError> {
        match self {
            Self::Line { origin, direction } => {
                out.point(origin).point(direction);
            }
            Self::Circle { frame, radius } => {
                out.frame3d(frame).real(*radius);
            }
            Self::Ellipse {
                frame,
                major_radius,
                minor_radius,
            }
            | Self::Hyperbola {
                frame,
                major_radius,
                minor_radius,
            } => {
                out.frame3d(frame).real(*major_radius).real(*minor_radius);
            }
            Self::Parabola { frame, focal } => {
                out.frame3d(frame).real(*focal);
            }
            Self::Bezier(c) => c.parameters(out),
            Self::BSpline(c) => c.parameters(out),
            Self::Trimmed { basis, first, last } => {
                out.basis(self.kind(), basis)?.real(*first).real(*last);
            }
            Self::Offset {
                basis,
                distance,
                direction,
            } => {
                out.basis(self.kind(), basis)?
                    .real(*distance)
                    .point(direction);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Param;

    fn params_of(curve: &Curve3d) -> Vec<Param> {
        let mut out = ParamList::default();
        curve.parameters(&mut out).unwrap();
        out.finish()
    }

    #[test]
    fn kinds_match_variants() {
        let line = Curve2d::Line {
            origin: [0.0, 0.0],
            direction: [1.0, 0.0],
        };
        assert_eq!(line.kind(), Kind::Line2d);

        let circle = Curve3d::Circle {
            frame: Frame3d::at([0.0; 3]),
            radius: 1.0,
        };
        assert_eq!(circle.kind(), Kind::Circle);
    }

    #[test]
    fn ellipse_and_hyperbola_share_layout_but_not_kind() {
        let frame = Frame3d::at([0.0; 3]);
        let ellipse = Curve3d::Ellipse {
            frame,
            major_radius: 2.0,
            minor_radius: 1.0,
        };
        let hyperbola = Curve3d::Hyperbola {
            frame,
            major_radius: 2.0,
            minor_radius: 1.0,
        };
        assert_eq!(params_of(&ellipse), params_of(&hyperbola));
        assert_ne!(ellipse.kind(), hyperbola.kind());
    }

    #[test]
    fn bspline_parameter_layout() {
        let curve = Curve3d::BSpline(BSplineCurve {
            degree: 1,
            periodic: false,
            knots: vec![0.0, 1.0],
            multiplicities: vec![2, 2],
            poles: vec![[0.0; 3], [1.0, 0.0, 0.0]],
            weights: None,
        });
        let params = params_of(&curve);
        assert_eq!(params[0], Param::Count(1));
        assert_eq!(params[1], Param::Flag(false));
        assert_eq!(params[2], Param::Count(2));
        // 1 + 1 + (1+2) + (1+2) + (1+6) + 1
        assert_eq!(params.len(), 16);
    }

    #[test]
    fn basis_accessors() {
        let mut offset = Curve2d::Offset {
            basis: Basis::inline(Curve2d::Line {
                origin: [0.0, 0.0],
                direction: [0.0, 1.0],
            }),
            distance: 1.0,
        };
        assert!(offset.basis().is_some());
        assert!(offset.basis_mut().is_some());
        assert!(Curve2d::Parabola {
            frame: Frame2d::at([0.0, 0.0]),
            focal: 1.0
        }
        .basis()
        .is_none());
    }
}
