//! Cryptographic utilities
//!
//! This module provides:
//! - Keccak-256 hashing
//! - ECDSA key management (secp256k1) and Ethereum address derivation
//! - 65-byte recoverable signatures

pub mod hash;
pub mod keys;
pub mod signature;

pub use hash::{keccak256, keccak256_concat, keccak256_hex};
pub use keys::{
    public_key_to_address, recover_address, sign_hash, KeyError, KeyPair, ECRECOVER_V_OFFSET,
};
pub use signature::{Signature, SIGNATURE_LENGTH};
