//! Canonical hashing for GeoVault.
//!
//! Maps a geometric entity (or a topology record) to its [`ObjectIdentity`]
//! without touching storage. The pipeline is: extract the kind's canonical
//! parameters, quantize every real under a versioned policy, serialize into a
//! canonical buffer, and run domain-separated BLAKE3 over it.
//!
//! Hashing is pure: the same entity produces the same identity in any
//! process, in any order, on any platform.
//!
//! [`ObjectIdentity`]: gvault_types::ObjectIdentity

pub mod canonical;
pub mod error;
pub mod hasher;
pub mod quantize;

pub use canonical::CanonicalBuffer;
pub use error::{HashError, HashResult};
pub use hasher::{CanonicalHasher, ContentHasher};
pub use quantize::{Quantizer, QUANTIZATION_VERSION};
