//! ECDSA key management
//!
//! Provides key pair generation, Ethereum address derivation, recoverable
//! signing of 32-byte digests and signer recovery using the secp256k1 curve.

use alloy_primitives::{Address, B256};
use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

use super::hash::keccak256;
use super::signature::Signature;

/// Offset added to the recovery id for signatures checked by `ecrecover`
pub const ECRECOVER_V_OFFSET: u8 = 27;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key, with or without `0x`
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let trimmed = hex_key.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Ethereum address of this key pair
    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key)
    }

    /// Sign a 32-byte digest, returning `v` in the `ecrecover` form (27/28)
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature, KeyError> {
        sign_hash(&self.secret_key, hash)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Convert a public key to an Ethereum address
///
/// Address = last 20 bytes of Keccak-256(uncompressed point without the 0x04 tag)
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    Address::from_slice(&hash[12..])
}

/// Sign a 32-byte digest with a secret key
pub fn sign_hash(secret_key: &SecretKey, hash: &B256) -> Result<Signature, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(hash.as_slice())?;
    let (recovery_id, compact) = secp
        .sign_ecdsa_recoverable(&message, secret_key)
        .serialize_compact();

    let parity = recovery_id.to_i32() as u8;
    Ok(Signature::new(
        B256::from_slice(&compact[..32]),
        B256::from_slice(&compact[32..]),
        parity + ECRECOVER_V_OFFSET,
    ))
}

/// Recover the signing address from a digest and a 65-byte signature
pub fn recover_address(hash: &B256, signature: &Signature) -> Result<Address, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(hash.as_slice())?;

    let recovery_id = RecoveryId::from_i32(signature.y_parity() as i32)?;
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(signature.r.as_slice());
    compact[32..].copy_from_slice(signature.s.as_slice());
    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)?;

    let public_key = secp.recover_ecdsa(&message, &recoverable)?;
    Ok(public_key_to_address(&public_key))
}
