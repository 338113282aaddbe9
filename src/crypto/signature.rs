//! 65-byte ECDSA signatures in the `r || s || v` layout

use alloy_primitives::B256;
use std::fmt;

use super::keys::{KeyError, ECRECOVER_V_OFFSET};

/// Length of a serialized signature
pub const SIGNATURE_LENGTH: usize = 65;

/// An ECDSA signature {r:32, s:32, v:1}
///
/// Serialized as `r || s || v`, which is the chunk layout the account
/// contract splits its `signatures` argument into.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl Signature {
    pub fn new(r: B256, s: B256, v: u8) -> Self {
        Self { r, s, v }
    }

    /// Parse from the 65-byte `r || s || v` layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
            v: bytes[64],
        })
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(value: &str) -> Result<Self, KeyError> {
        let trimmed = value.strip_prefix("0x").unwrap_or(value);
        let bytes =
            hex::decode(trimmed).map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }

    /// Lowercase hex without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Recovery parity, accepting both `0/1` and `27/28` encodings of `v`
    pub fn y_parity(&self) -> u8 {
        if self.v >= ECRECOVER_V_OFFSET {
            self.v - ECRECOVER_V_OFFSET
        } else {
            self.v
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
