//! Multisig account transactions
//!
//! This module provides:
//! - The account transaction message and its structured-data hashing
//! - Per-transaction sessions binding the message to on-chain account state
//! - Ordered signature aggregation
//! - The coordinator driving collection, relay signing and broadcast

pub mod abi;
pub mod aggregate;
pub mod coordinator;
pub mod hashing;
pub mod message;
pub mod session;
pub mod typed_data;

use alloy_primitives::Address;
use thiserror::Error;

pub use aggregate::SignatureAggregator;
pub use coordinator::{
    BroadcastOutcome, ConfirmationPort, SafeCoordinator, SignOutcome, SignatureProgress,
};
pub use hashing::{
    domain_hash, message_hash, transaction_hash, DEFAULT_SIGN_MAGIC, DOMAIN_TYPEHASH,
    SAFE_TX_TYPEHASH,
};
pub use message::{Operation, SafeMessage, SafeTxParams};
pub use session::SafeSession;
pub use typed_data::SafeTypedData;

use crate::crypto::KeyError;
use crate::node::NetworkError;
use crate::signer::SignerError;
use crate::storage::StoreError;

/// Errors surfaced by account operations
#[derive(Error, Debug)]
pub enum SafeError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{0} is not an owner of the account")]
    NotOwner(Address),
    #[error("Insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: u64 },
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}
