//! Cryptographic hashing utilities
//!
//! Provides the Keccak-256 based hashing used for structured-data hashes,
//! aggregation keys, address derivation and transaction hashes.

use alloy_primitives::{keccak256 as alloy_keccak256, B256};

/// Computes Keccak-256 of the input data
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    alloy_keccak256(data)
}

/// Computes Keccak-256 over the concatenation of several byte slices
///
/// Equivalent to hashing `parts[0] || parts[1] || ...` without allocating
/// an intermediate buffer for callers that already hold the parts.
pub fn keccak256_concat(parts: &[&[u8]]) -> B256 {
    let total = parts.iter().map(|p| p.len()).sum();
    let mut buf = Vec::with_capacity(total);
    for part in parts {
        buf.extend_from_slice(part);
    }
    alloy_keccak256(&buf)
}

/// Computes Keccak-256 and returns it as a lowercase hex string (no prefix)
pub fn keccak256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(keccak256(data))
}
