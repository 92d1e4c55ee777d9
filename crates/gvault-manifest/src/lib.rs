//! The GeoVault manifest.
//!
//! The manifest is the catalog correlating every stored object's identity with
//! its physical location, reference count, creation time, and the identities
//! it refers to. It is an index over the payload segments, never their sole
//! source of truth: [`Manifest::rebuild`] regenerates an equivalent catalog
//! from scanned payload records alone.
//!
//! # On-disk format
//!
//! ```text
//! [4 bytes: magic "GVM1"]
//! [4 bytes: format version (little-endian u32)]
//! [4 bytes: CRC32 of body (little-endian u32)]
//! [8 bytes: body length (little-endian u64)]
//! [N bytes: body (bincode)]
//! ```
//!
//! Saves go to a temporary file in the same directory which is then renamed
//! over the old manifest, so a crash leaves either the old or the new catalog.

pub mod entry;
pub mod error;
pub mod manifest;

pub use entry::{Locator, ManifestEntry, ScannedRecord};
pub use error::{ManifestError, ManifestResult};
pub use manifest::{Manifest, RebuildSummary};
