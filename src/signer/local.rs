//! Software signer holding a private key in memory

use alloy_primitives::{Address, B256, U256};
use std::env;

use super::{check_address, SignerError};
use crate::crypto::{KeyPair, Signature};
use crate::safe::{transaction_hash, SafeTypedData, DEFAULT_SIGN_MAGIC};
use crate::tx::{encode_signed, signing_hash, SignatureComponents, SignedRelayTx, UnsignedRelayTx};

/// Signer over a local secp256k1 key
#[derive(Debug)]
pub struct LocalKeySigner {
    key: KeyPair,
}

impl LocalKeySigner {
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }

    /// Load the hex private key held in the environment variable `key_name`
    pub fn from_env(key_name: &str) -> Result<Self, SignerError> {
        let value = env::var(key_name).map_err(|_| SignerError::MissingKey(key_name.to_string()))?;
        Ok(Self::new(KeyPair::from_private_key_hex(&value)?))
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn verify_address(&self, expected: Address) -> Result<Address, SignerError> {
        check_address(expected, self.address())?;
        Ok(expected)
    }

    /// Sign `keccak256(0x1901 || domain_hash || message_hash)`
    pub fn sign_typed_data_hash(
        &self,
        expected: Address,
        domain_hash: &B256,
        message_hash: &B256,
    ) -> Result<Signature, SignerError> {
        self.verify_address(expected)?;
        let digest = transaction_hash(&DEFAULT_SIGN_MAGIC, domain_hash, message_hash);
        Ok(self.key.sign_hash(&digest)?)
    }

    pub fn sign_typed_data(
        &self,
        expected: Address,
        data: &SafeTypedData,
    ) -> Result<Signature, SignerError> {
        self.verify_address(expected)?;
        Ok(self.key.sign_hash(&data.signing_hash())?)
    }

    /// Sign and encode `tx` in one step
    pub fn sign_transaction(
        &self,
        expected: Address,
        tx: &UnsignedRelayTx,
    ) -> Result<SignedRelayTx, SignerError> {
        self.verify_address(expected)?;
        let sig = self.key.sign_hash(&signing_hash(tx))?;
        let components = SignatureComponents::new(
            u64::from(sig.y_parity()),
            U256::from_be_bytes(sig.r.0),
            U256::from_be_bytes(sig.s.0),
        );
        Ok(encode_signed(tx, &components))
    }
}
