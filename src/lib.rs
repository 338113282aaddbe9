//! Safe Signer: off-chain signature collection for multisig accounts in Rust
//!
//! This crate provides:
//! - EIP-712 domain, message and transaction hashing for Safe transactions
//! - A persistent signature store keyed by transaction hash and signer
//! - Signing backends for local keys, Ledger, Trezor One and Trezor T
//! - Threshold aggregation in ascending signer order
//! - EIP-1559 relay transaction building, signing and broadcast
//!
//! # Example
//!
//! ```rust
//! use alloy_primitives::{Address, Bytes, U256};
//! use safe_signer::crypto::KeyPair;
//! use safe_signer::safe::{SafeTxParams, SafeTypedData};
//! use safe_signer::signer::{LocalKeySigner, Signer};
//!
//! let safe = Address::repeat_byte(0x12);
//! let message = SafeTxParams::call(Address::repeat_byte(0x34), U256::ZERO, Bytes::new())
//!     .with_nonce(U256::from(7));
//! let typed = SafeTypedData::new(message, 1, safe);
//!
//! let owner = LocalKeySigner::new(KeyPair::generate());
//! let address = owner.address();
//! let signature = Signer::LocalKey(owner)
//!     .sign_message(address, &typed)
//!     .unwrap();
//! println!("Signature: 0x{}", signature.to_hex());
//! ```

pub mod cli;
pub mod config;
pub mod crypto;
pub mod node;
pub mod safe;
pub mod signer;
pub mod storage;
pub mod tx;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use crypto::{keccak256, KeyPair, Signature};
pub use node::{JsonRpcClient, NetworkError, NodeClient, RpcSafeAccount, SafeAccount};
pub use safe::{
    SafeCoordinator, SafeError, SafeMessage, SafeSession, SafeTxParams, SafeTypedData,
    SignatureAggregator,
};
pub use signer::{Capabilities, Signer, SignerError};
pub use storage::{FileSignatureStore, MemorySignatureStore, SignatureStore, StoreError};
pub use tx::{RelayTransactionSigner, SignedRelayTx, TransactionBuilder, UnsignedRelayTx};
