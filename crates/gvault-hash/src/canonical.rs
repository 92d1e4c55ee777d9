use gvault_types::{Kind, ObjectIdentity, Param};

use crate::quantize::Quantizer;

const TAG_REAL: u8 = 0x01;
const TAG_COUNT: u8 = 0x02;
const TAG_FLAG: u8 = 0x03;
const TAG_REF: u8 = 0x04;
const TAG_TEXT: u8 = 0x05;

/// Byte buffer in canonical form, ready for the content hasher.
///
/// Layout: quantization version, kind tag, dimensionality tag, then each item
/// as a type byte followed by a fixed-width little-endian value. Reals are
/// quantized on the way in. Text is length-prefixed UTF-8.
#[derive(Debug)]
pub struct CanonicalBuffer {
    quantizer: Quantizer,
    bytes: Vec<u8>,
}

impl CanonicalBuffer {
    pub fn new(quantizer: Quantizer, kind: Kind) -> Self {
        let mut bytes = Vec::with_capacity(128);
        bytes.push(quantizer.version());
        bytes.push(kind.tag());
        bytes.push(kind.dimensionality().tag());
        Self { quantizer, bytes }
    }

    pub fn param(&mut self, param: &Param) {
        match *param {
            Param::Real(x) => {
                self.bytes.push(TAG_REAL);
                self.bytes
                    .extend_from_slice(&self.quantizer.real(x).to_bits().to_le_bytes());
            }
            Param::Count(n) => {
                self.bytes.push(TAG_COUNT);
                self.bytes.extend_from_slice(&n.to_le_bytes());
            }
            Param::Flag(b) => {
                self.bytes.push(TAG_FLAG);
                self.bytes.push(b as u8);
            }
            Param::Ref(identity) => self.identity(&identity),
        }
    }

    pub fn params(&mut self, params: &[Param]) {
        for p in params {
            self.param(p);
        }
    }

    pub fn identity(&mut self, identity: &ObjectIdentity) {
        self.bytes.push(TAG_REF);
        self.bytes.extend_from_slice(&identity.to_bytes());
    }

    pub fn text(&mut self, text: &str) {
        self.bytes.push(TAG_TEXT);
        self.bytes
            .extend_from_slice(&(text.len() as u64).to_le_bytes());
        self.bytes.extend_from_slice(text.as_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
