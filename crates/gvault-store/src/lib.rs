//! Typed object stores for GeoVault.
//!
//! One [`TypedStore`] exists per [`KindFamily`]. Each owns an append-only
//! payload segment of self-describing records and performs
//! insert-if-absent deduplication against the shared manifest.
//!
//! # Design Rules
//!
//! 1. Equal canonical content is stored at most once per archive.
//! 2. The check-then-insert inside `put` runs under the family's write lock.
//! 3. Reference-count changes are appended as delta records, so the catalog
//!    can be rebuilt from segments alone.
//! 4. Removal is logical; records are dropped only by a compaction rewrite.
//! 5. Every read re-validates the record checksum and recomputes the digest.
//!
//! [`KindFamily`]: gvault_types::KindFamily

pub mod cancel;
pub mod error;
pub mod record;
pub mod retry;
pub mod segment;
pub mod storable;
pub mod typed;

pub use cancel::CancelToken;
pub use error::{StoreError, StoreResult};
pub use record::{Record, RecordFault, RecordHeader, RecordValue, HEADER_LEN, PAYLOAD_VERSION};
pub use retry::RetryPolicy;
pub use segment::{PayloadSegment, SegmentRewriter, SegmentScan};
pub use storable::Storable;
pub use typed::{
    CorruptRecord, PreparedSegment, PutOutcome, ScanReport, SegmentGuard, TypedStore,
};
