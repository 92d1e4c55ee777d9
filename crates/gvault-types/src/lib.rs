//! Foundation types for GeoVault.
//!
//! GeoVault is a content-addressed archive for B-Rep geometry. This crate
//! holds the value types every other GeoVault crate depends on: it never
//! hashes, stores, or evaluates anything.
//!
//! # Key Types
//!
//! - [`Digest`]: fixed-width (32 byte) canonical content hash
//! - [`Kind`]: closed enumeration of every storable kind, with stable tags
//! - [`KindFamily`]: the typed store a kind lives in
//! - [`ObjectIdentity`]: kind + dimensionality + digest
//! - [`ObjectRef`] / [`TopologyRef`]: non-owning handles into an archive
//! - [`Entity`]: the geometric entity model (curves, surfaces, meshes)
//! - [`TopologyRecord`]: a shape described purely as `(Role, ObjectRef)` pairs

pub mod digest;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod kind;
pub mod topology;

pub use digest::Digest;
pub use error::TypeError;
pub use geometry::{
    Basis, BezierCurve, BezierSurface, BSplineCurve, BSplineSurface, Curve2d, Curve3d, Entity,
    Frame2d, Frame3d, Param, Point2, Point3, Polygon, Surface, Triangulation,
};
pub use identity::{ObjectIdentity, ObjectRef, TopologyRef, IDENTITY_LEN};
pub use kind::{Dimensionality, Kind, KindFamily};
pub use topology::{Role, TopologyEntry, TopologyRecord};
