//! Signing backends
//!
//! [`Signer`] is a closed set of backends, each declaring what it can sign:
//!
//! | backend    | hash pair | typed data | transaction          |
//! |------------|-----------|------------|----------------------|
//! | local key  | yes       | yes        | yes, encoded         |
//! | Ledger     | yes       | no         | no                   |
//! | Trezor One | yes       | no         | yes, components      |
//! | Trezor T   | no        | yes        | yes, components      |
//!
//! Every signing call checks the backend's address against the expected one
//! first and fails with [`SignerError::AddressMismatch`] before anything is
//! signed. Hardware calls run inside a single [`DeviceSession`].

pub mod derivation;
pub mod eip712;
pub mod ledger;
#[cfg(feature = "ledger-hid")]
pub mod ledger_hid;
pub mod local;
pub mod session;
pub mod trezor;
#[cfg(feature = "trezor-usb")]
pub mod trezor_usb;

use alloy_primitives::{Address, B256};
use bitflags::bitflags;
use thiserror::Error;

pub use derivation::DerivationPath;
pub use ledger::{
    ApduConnector, ApduTransport, LedgerSigner, TcpApduConnector, TcpApduTransport,
};
pub use local::LocalKeySigner;
pub use session::{Device, DeviceSession};
pub use trezor::{DisconnectedTrezor, TrezorConnector, TrezorSession, TrezorSigner};

#[cfg(feature = "ledger-hid")]
pub use ledger_hid::HidApduConnector;
#[cfg(feature = "trezor-usb")]
pub use trezor_usb::TrezorUsbConnector;

use crate::crypto::{KeyError, Signature};
use crate::safe::SafeTypedData;
use crate::tx::{SignatureComponents, SignedRelayTx, UnsignedRelayTx};

/// Signer errors
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Address mismatch: expected {expected}, device holds {actual}")]
    AddressMismatch { expected: Address, actual: Address },
    #[error("Device communication error: {0}")]
    DeviceCommunication(String),
    #[error("Device error: {0}")]
    DeviceIo(String),
    #[error("{backend} does not support {operation}")]
    UnsupportedOperation {
        backend: &'static str,
        operation: &'static str,
    },
    #[error("Private key variable {0} is not set")]
    MissingKey(String),
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("Invalid typed data: {0}")]
    InvalidTypedData(String),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

pub(crate) fn check_address(expected: Address, actual: Address) -> Result<(), SignerError> {
    if expected != actual {
        return Err(SignerError::AddressMismatch { expected, actual });
    }
    Ok(())
}

bitflags! {
    /// Operations a backend can perform
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// EIP-712 signature from a precomputed domain/message hash pair
        const SIGN_HASH_PAIR = 1 << 0;
        /// EIP-712 signature from the full typed-data document
        const SIGN_TYPED_DATA = 1 << 1;
        /// Fee-market transaction signature
        const SIGN_TRANSACTION = 1 << 2;
    }
}

/// What a backend's transaction signature looks like
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxSignatureShape {
    /// Bare `(v, r, s)`; the caller encodes the envelope
    Components,
    /// The finished broadcastable encoding
    Encoded,
}

/// Result of [`Signer::sign_transaction`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionSignature {
    Components(SignatureComponents),
    Encoded(SignedRelayTx),
}

/// A configured signing backend
pub enum Signer {
    LocalKey(LocalKeySigner),
    Ledger(LedgerSigner),
    TrezorOne(TrezorSigner),
    TrezorT(TrezorSigner),
}

impl Signer {
    pub fn backend(&self) -> &'static str {
        match self {
            Signer::LocalKey(_) => "local key",
            Signer::Ledger(_) => "Ledger",
            Signer::TrezorOne(_) => "Trezor One",
            Signer::TrezorT(_) => "Trezor T",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Signer::LocalKey(_) => Capabilities::all(),
            Signer::Ledger(_) => Capabilities::SIGN_HASH_PAIR,
            Signer::TrezorOne(_) => Capabilities::SIGN_HASH_PAIR | Capabilities::SIGN_TRANSACTION,
            Signer::TrezorT(_) => Capabilities::SIGN_TYPED_DATA | Capabilities::SIGN_TRANSACTION,
        }
    }

    /// Shape of [`Signer::sign_transaction`] output, `None` if unsupported
    pub fn transaction_shape(&self) -> Option<TxSignatureShape> {
        match self {
            Signer::LocalKey(_) => Some(TxSignatureShape::Encoded),
            Signer::TrezorOne(_) | Signer::TrezorT(_) => Some(TxSignatureShape::Components),
            Signer::Ledger(_) => None,
        }
    }

    fn unsupported(&self, operation: &'static str) -> SignerError {
        SignerError::UnsupportedOperation {
            backend: self.backend(),
            operation,
        }
    }

    /// Check the backend holds `expected`
    pub fn verify_address(&self, expected: Address) -> Result<Address, SignerError> {
        match self {
            Signer::LocalKey(s) => s.verify_address(expected),
            Signer::Ledger(s) => s.verify_address(expected),
            Signer::TrezorOne(s) | Signer::TrezorT(s) => s.verify_address(expected),
        }
    }

    pub fn sign_typed_data_hash(
        &self,
        expected: Address,
        domain_hash: &B256,
        message_hash: &B256,
    ) -> Result<Signature, SignerError> {
        match self {
            Signer::LocalKey(s) => s.sign_typed_data_hash(expected, domain_hash, message_hash),
            Signer::Ledger(s) => s.sign_typed_data_hash(expected, domain_hash, message_hash),
            Signer::TrezorOne(s) => s.sign_typed_data_hash(expected, domain_hash, message_hash),
            Signer::TrezorT(_) => Err(self.unsupported("typed data hash signing")),
        }
    }

    pub fn sign_typed_data(
        &self,
        expected: Address,
        data: &SafeTypedData,
    ) -> Result<Signature, SignerError> {
        match self {
            Signer::LocalKey(s) => s.sign_typed_data(expected, data),
            Signer::TrezorT(s) => s.sign_typed_data(expected, data),
            Signer::Ledger(_) | Signer::TrezorOne(_) => {
                Err(self.unsupported("full typed data signing"))
            }
        }
    }

    /// Sign an account message, hash pair first, full document otherwise
    pub fn sign_message(
        &self,
        expected: Address,
        data: &SafeTypedData,
    ) -> Result<Signature, SignerError> {
        let capabilities = self.capabilities();
        if capabilities.contains(Capabilities::SIGN_HASH_PAIR) {
            log::debug!("Signing hash pair with {}", self.backend());
            self.sign_typed_data_hash(expected, &data.domain_hash(), &data.message_hash())
        } else if capabilities.contains(Capabilities::SIGN_TYPED_DATA) {
            log::debug!("Signing typed data document with {}", self.backend());
            self.sign_typed_data(expected, data)
        } else {
            Err(self.unsupported("typed data signing"))
        }
    }

    pub fn sign_transaction(
        &self,
        expected: Address,
        tx: &UnsignedRelayTx,
    ) -> Result<TransactionSignature, SignerError> {
        match self {
            Signer::LocalKey(s) => s
                .sign_transaction(expected, tx)
                .map(TransactionSignature::Encoded),
            Signer::TrezorOne(s) | Signer::TrezorT(s) => s
                .sign_transaction(expected, tx)
                .map(TransactionSignature::Components),
            Signer::Ledger(_) => Err(self.unsupported("transaction signing")),
        }
    }
}
