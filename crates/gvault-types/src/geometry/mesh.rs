use serde::{Deserialize, Serialize};

use super::{Basis, ParamList, Point2, Point3};
use crate::error::TypeError;
use crate::kind::Kind;

/// Discrete approximation of a curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Polygon {
    /// deflection, nodes
    Polygon2d { nodes: Vec<Point2>, deflection: f64 },
    /// deflection, nodes, optional parameters
    Polygon3d {
        nodes: Vec<Point3>,
        parameters: Option<Vec<f64>>,
        deflection: f64,
    },
    /// triangulation, deflection, node indices, optional parameters
    OnTriangulation {
        triangulation: Basis,
        node_indices: Vec<u32>,
        parameters: Option<Vec<f64>>,
        deflection: f64,
    },
}

impl Polygon {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Polygon2d { .. } => Kind::Polygon2d,
            Self::Polygon3d { .. } => Kind::Polygon3d,
            Self::OnTriangulation { .. } => Kind::PolygonOnTriangulation,
        }
    }

    pub fn basis(&self) -> Option<&Basis> {
        match self {
            Self::OnTriangulation { triangulation, .. } => Some(triangulation),
            _ => None,
        }
    }

    pub fn basis_mut(&mut self) -> Option<&mut Basis> {
        match self {
            Self::OnTriangulation { triangulation, .. } => Some(triangulation),
            _ => None,
        }
    }

    pub(crate) fn parameters(&self, out: &mut ParamList) -> Result<(), TypeError> {
        match self {
            Self::Polygon2d { nodes, deflection } => {
                out.real(*deflection).points(nodes);
            }
            Self::Polygon3d {
                nodes,
                parameters,
                deflection,
            } => {
                out.real(*deflection)
                    .points(nodes)
                    .optional_reals(parameters.as_deref());
            }
            Self::OnTriangulation {
                triangulation,
                node_indices,
                parameters,
                deflection,
            } => {
                out.basis(self.kind(), triangulation)?
                    .real(*deflection)
                    .counts(node_indices)
                    .optional_reals(parameters.as_deref());
            }
        }
        Ok(())
    }
}

/// Triangle mesh approximating a surface.
///
/// Parameters: deflection, nodes, optional uv nodes, triangles (count, then
/// three indices each).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triangulation {
    pub nodes: Vec<Point3>,
    pub uv_nodes: Option<Vec<Point2>>,
    pub triangles: Vec<[u32; 3]>,
    pub deflection: f64,
}

impl Triangulation {
    pub(crate) fn parameters(&self, out: &mut ParamList) {
        out.real(self.deflection).points(&self.nodes);
        match &self.uv_nodes {
            Some(uv) => {
                out.flag(true).points(uv);
            }
            None => {
                out.flag(false);
            }
        }
        out.count(self.triangles.len());
        for triangle in &self.triangles {
            for &index in triangle {
                out.count(index as usize);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Param;

    fn unit_triangle() -> Triangulation {
        Triangulation {
            nodes: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            uv_nodes: None,
            triangles: vec![[0, 1, 2]],
            deflection: 0.01,
        }
    }

    #[test]
    fn triangle_winding_changes_parameters() {
        let a = unit_triangle();
        let mut b = unit_triangle();
        b.triangles = vec![[0, 2, 1]];

        let (mut pa, mut pb) = (ParamList::default(), ParamList::default());
        a.parameters(&mut pa);
        b.parameters(&mut pb);
        assert_ne!(pa.finish(), pb.finish());
    }

    #[test]
    fn triangulation_layout() {
        let mut out = ParamList::default();
        unit_triangle().parameters(&mut out);
        let params = out.finish();
        assert_eq!(params[0], Param::Real(0.01));
        assert_eq!(params[1], Param::Count(3));
        // deflection + (1 + 9) + flag + (1 + 3)
        assert_eq!(params.len(), 16);
    }

    #[test]
    fn polygon_kinds() {
        let p2 = Polygon::Polygon2d {
            nodes: vec![[0.0, 0.0]],
            deflection: 0.0,
        };
        assert_eq!(p2.kind(), Kind::Polygon2d);
        assert!(p2.basis().is_none());

        let on = Polygon::OnTriangulation {
            triangulation: Basis::inline(unit_triangle()),
            node_indices: vec![0, 1],
            parameters: None,
            deflection: 0.0,
        };
        assert_eq!(on.kind(), Kind::PolygonOnTriangulation);
        assert!(on.basis().is_some());
    }
}
