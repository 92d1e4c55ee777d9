//! GeoVault archive façade.
//!
//! An [`Archive`] owns one directory holding a configuration file, a
//! manifest, and one payload segment per kind family:
//!
//! ```text
//! <root>/archive.toml
//! <root>/manifest.gvm
//! <root>/payload/{curve2d,curve3d,surface,polygon,triangulation,topology}.gvp
//! ```
//!
//! Geometry goes in through [`Archive::add`] and comes back through
//! [`Archive::get`]; equal content is stored once and reference counted.
//! Shapes are stored as topology records through a kernel-supplied
//! [`ShapeExtractor`] and rebuilt through a [`ShapeReconstructor`].
//!
//! # Design Rules
//!
//! 1. Adds and removes are durable only after [`Archive::flush`] or
//!    [`Archive::close`].
//! 2. A stored object holds one reference on each object it refers to,
//!    released only when compaction drops it.
//! 3. Removal is logical; [`Archive::compact`] reclaims space.
//! 4. The manifest can always be rebuilt from the payload segments.
//! 5. Errors from the stores and the manifest pass through unchanged.

pub mod archive;
pub mod compact;
pub mod config;
pub mod error;
pub mod stats;
pub mod topology;
pub mod verify;

pub use archive::{Archive, RecoveryReport, CONFIG_FILE, MANIFEST_FILE, PAYLOAD_DIR};
pub use compact::CompactReport;
pub use config::{ArchiveConfig, FORMAT_VERSION};
pub use error::{ArchiveError, ArchiveResult};
pub use gvault_store::CancelToken;
pub use stats::{ArchiveStats, FamilyStats, KindStats};
pub use topology::{ShapeExtractor, ShapeReconstructor};
pub use verify::{Problem, VerifyIssue, VerifyReport, VerifyScope};
