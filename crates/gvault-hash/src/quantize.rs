use gvault_types::Param;

use crate::error::{HashError, HashResult};

/// The quantization policy version written by this build.
pub const QUANTIZATION_VERSION: u8 = 1;

/// Mantissa bits dropped by policy v1 (52 - 30 kept).
const DROPPED_BITS: u32 = 22;

/// Magnitudes below this flush to +0.0 under policy v1.
const FLUSH_THRESHOLD: f64 = 1e-12;

const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// Versioned floating-point quantization policy.
///
/// Policy v1 keeps 30 mantissa bits with round-to-nearest (relative
/// resolution about 9.3e-10), flushes magnitudes below 1e-12 to +0.0, maps
/// -0.0 to +0.0 and every NaN to a single canonical NaN. Infinities are kept.
///
/// The version is mixed into every digest, so changing the policy changes
/// every identity; archives record the version they were written with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quantizer {
    version: u8,
}

impl Quantizer {
    /// The current policy.
    pub const V1: Self = Self { version: 1 };

    /// Look up a policy by version.
    pub fn for_version(version: u8) -> HashResult<Self> {
        match version {
            1 => Ok(Self::V1),
            other => Err(HashError::UnsupportedQuantization(other)),
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Quantize one real.
    pub fn real(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::from_bits(CANONICAL_NAN);
        }
        if x.abs() < FLUSH_THRESHOLD {
            return 0.0;
        }
        let half = 1u64 << (DROPPED_BITS - 1);
        let mask = !((1u64 << DROPPED_BITS) - 1);
        f64::from_bits(x.to_bits().wrapping_add(half) & mask)
    }

    /// Quantize every real in a parameter sequence; other items pass through.
    pub fn params(&self, params: &[Param]) -> Vec<Param> {
        params
            .iter()
            .map(|p| match *p {
                Param::Real(x) => Param::Real(self.real(x)),
                other => other,
            })
            .collect()
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::V1
    }
}
