//! Self-describing payload records.
//!
//! Every record starts with a fixed 64-byte header:
//!
//! ```text
//! [ 0.. 4] magic "GVR1"
//! [ 4    ] record type (1 = object, 2 = reference delta)
//! [ 5    ] kind tag
//! [ 6    ] dimensionality tag
//! [ 7    ] payload format version
//! [ 8..40] digest
//! [40..48] reference value (LE; u64 base count or i64 delta)
//! [48..56] created-at, unix milliseconds (LE u64)
//! [56..60] body length (LE u32)
//! [60..64] CRC32 over bytes 0..60 and the body (LE u32)
//! ```
//!
//! Object records carry a bincode body; delta records have an empty body.

use gvault_types::{ObjectIdentity, TypeError, IDENTITY_LEN};

pub const HEADER_LEN: usize = 64;
pub const PAYLOAD_VERSION: u8 = 1;

pub(crate) const MAGIC: &[u8; 4] = b"GVR1";
const TYPE_OBJECT: u8 = 1;
const TYPE_DELTA: u8 = 2;
const CRC_OFFSET: usize = 60;

/// Why a record failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordFault {
    #[error("bad record magic")]
    BadMagic,

    #[error("unknown record type {0}")]
    UnknownType(u8),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid identity: {0}")]
    BadIdentity(#[from] TypeError),

    #[error("record length {actual} does not match header ({expected})")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Bytes skipped to reach the next valid record.
    #[error("{len} unreadable bytes ({cause})")]
    Unreadable { len: u64, cause: Box<RecordFault> },
}

/// The reference value a record carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordValue {
    /// Reference count at the time the object record was written.
    Object { ref_count: u64 },
    /// Signed change to a previously written object's count.
    Delta { delta: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub identity: ObjectIdentity,
    pub value: RecordValue,
    pub payload_version: u8,
    pub created_at: u64,
    pub body_len: u32,
    pub crc: u32,
}

impl RecordHeader {
    /// Parse a header without checking the CRC (the body is needed for that).
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, RecordFault> {
        if &bytes[0..4] != MAGIC {
            return Err(RecordFault::BadMagic);
        }
        let raw_value = u64::from_le_bytes(array(&bytes[40..48]));
        let value = match bytes[4] {
            TYPE_OBJECT => RecordValue::Object {
                ref_count: raw_value,
            },
            TYPE_DELTA => RecordValue::Delta {
                delta: raw_value as i64,
            },
            other => return Err(RecordFault::UnknownType(other)),
        };
        let payload_version = bytes[7];
        if payload_version != PAYLOAD_VERSION {
            return Err(RecordFault::UnsupportedVersion(payload_version));
        }
        let mut id_bytes = [0u8; IDENTITY_LEN];
        id_bytes[0] = bytes[5];
        id_bytes[1] = bytes[6];
        id_bytes[2..].copy_from_slice(&bytes[8..40]);
        let identity = ObjectIdentity::from_bytes(&id_bytes)?;
        Ok(Self {
            identity,
            value,
            payload_version,
            created_at: u64::from_le_bytes(array(&bytes[48..56])),
            body_len: u32::from_le_bytes(array(&bytes[56..60])),
            crc: u32::from_le_bytes(array(&bytes[60..64])),
        })
    }

    /// Total record length, header included.
    pub fn record_len(&self) -> usize {
        HEADER_LEN + self.body_len as usize
    }
}

/// A decoded, checksum-verified record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    pub body: Vec<u8>,
}

impl Record {
    /// Encode an object record.
    pub fn encode_object(
        identity: &ObjectIdentity,
        ref_count: u64,
        created_at: u64,
        body: &[u8],
    ) -> Vec<u8> {
        encode(TYPE_OBJECT, identity, ref_count, created_at, body)
    }

    /// Encode a reference delta record.
    pub fn encode_delta(identity: &ObjectIdentity, delta: i64, created_at: u64) -> Vec<u8> {
        encode(TYPE_DELTA, identity, delta as u64, created_at, &[])
    }

    /// Decode and verify one complete record.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordFault> {
        if bytes.len() < HEADER_LEN {
            return Err(RecordFault::LengthMismatch {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let header = RecordHeader::parse(&array(&bytes[..HEADER_LEN]))?;
        if bytes.len() != header.record_len() {
            return Err(RecordFault::LengthMismatch {
                expected: header.record_len(),
                actual: bytes.len(),
            });
        }
        let actual = checksum(&bytes[..CRC_OFFSET], &bytes[HEADER_LEN..]);
        if actual != header.crc {
            return Err(RecordFault::ChecksumMismatch {
                expected: header.crc,
                actual,
            });
        }
        Ok(Self {
            header,
            body: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

fn encode(
    record_type: u8,
    identity: &ObjectIdentity,
    value: u64,
    created_at: u64,
    body: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(MAGIC);
    buf.push(record_type);
    buf.push(identity.kind().tag());
    buf.push(identity.dimensionality().tag());
    buf.push(PAYLOAD_VERSION);
    buf.extend_from_slice(identity.digest().as_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&created_at.to_le_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    let crc = checksum(&buf, body);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

fn checksum(prefix: &[u8], body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(prefix);
    hasher.update(body);
    hasher.finalize()
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvault_types::{Digest, Dimensionality, Kind};

    fn identity() -> ObjectIdentity {
        ObjectIdentity::new(Kind::BSplineSurface, Digest::from_hash([0x42; 32]))
    }

    #[test]
    fn object_record_roundtrip() {
        let bytes = Record::encode_object(&identity(), 1, 1_700_000_000_123, b"body bytes");
        assert_eq!(bytes.len(), HEADER_LEN + 10);

        let record = Record::decode(&bytes).unwrap();
        assert_eq!(record.header.identity, identity());
        assert_eq!(record.header.value, RecordValue::Object { ref_count: 1 });
        assert_eq!(record.header.created_at, 1_700_000_000_123);
        assert_eq!(record.body, b"body bytes");
    }

    #[test]
    fn delta_record_keeps_sign() {
        let bytes = Record::encode_delta(&identity(), -1, 5);
        assert_eq!(bytes.len(), HEADER_LEN);
        let record = Record::decode(&bytes).unwrap();
        assert_eq!(record.header.value, RecordValue::Delta { delta: -1 });
        assert!(record.body.is_empty());
    }

    #[test]
    fn flipped_body_byte_fails_checksum() {
        let mut bytes = Record::encode_object(&identity(), 1, 0, b"payload");
        bytes[HEADER_LEN + 2] ^= 0xFF;
        assert!(matches!(
            Record::decode(&bytes),
            Err(RecordFault::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn flipped_digest_byte_fails_checksum() {
        let mut bytes = Record::encode_object(&identity(), 1, 0, b"payload");
        bytes[20] ^= 0x01;
        assert!(matches!(
            Record::decode(&bytes),
            Err(RecordFault::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_and_type() {
        let mut bytes = Record::encode_delta(&identity(), 1, 0);
        bytes[0] = b'X';
        assert_eq!(Record::decode(&bytes), Err(RecordFault::BadMagic));

        let mut bytes = Record::encode_delta(&identity(), 1, 0);
        bytes[4] = 9;
        assert_eq!(Record::decode(&bytes), Err(RecordFault::UnknownType(9)));
    }

    #[test]
    fn faults_carry_type_errors() {
        let fault = RecordFault::from(TypeError::UnknownKindTag(0x7f));
        let copy = fault.clone();
        assert_eq!(copy, fault);
        assert!(fault.to_string().contains("0x7f"));
    }

    #[test]
    fn truncated_record() {
        let bytes = Record::encode_object(&identity(), 1, 0, b"payload");
        assert!(matches!(
            Record::decode(&bytes[..bytes.len() - 1]),
            Err(RecordFault::LengthMismatch { .. })
        ));
    }

    #[test]
    fn header_fields_are_at_documented_offsets() {
        let bytes = Record::encode_object(&identity(), 7, 9, b"");
        assert_eq!(&bytes[0..4], b"GVR1");
        assert_eq!(bytes[5], Kind::BSplineSurface.tag());
        assert_eq!(bytes[6], Dimensionality::Spatial.tag());
        assert_eq!(&bytes[8..40], identity().digest().as_bytes());
        assert_eq!(u64::from_le_bytes(array(&bytes[40..48])), 7);
        assert_eq!(u64::from_le_bytes(array(&bytes[48..56])), 9);
        assert_eq!(u32::from_le_bytes(array(&bytes[56..60])), 0);
    }
}
