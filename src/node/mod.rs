//! Blockchain node collaborators
//!
//! The signing core only talks to the chain through the two traits defined
//! here. Every call is synchronous and blocking; failures surface as
//! [`NetworkError`] and are never retried.
//!
//! [`rpc`] provides a JSON-RPC implementation of both traits.

pub mod rpc;

use alloy_primitives::{Address, Bytes, B256, U256};
use thiserror::Error;

pub use rpc::{JsonRpcClient, RpcSafeAccount};

/// Node and broadcast failures
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Read access to the multisig account contract
pub trait SafeAccount {
    /// Address of the account contract
    fn address(&self) -> Address;
    fn threshold(&self) -> Result<u64, NetworkError>;
    fn owners(&self) -> Result<Vec<Address>, NetworkError>;
    fn is_owner(&self, address: Address) -> Result<bool, NetworkError>;
    fn nonce(&self) -> Result<U256, NetworkError>;
    fn chain_id(&self) -> Result<u64, NetworkError>;
    fn domain_separator(&self) -> Result<B256, NetworkError>;
}

/// A call the node is asked to estimate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Account-independent node queries and broadcast
pub trait NodeClient {
    fn transaction_count(&self, address: Address) -> Result<u64, NetworkError>;
    fn estimate_gas(&self, request: &CallRequest) -> Result<u64, NetworkError>;
    /// Current gas price in wei
    fn gas_price(&self) -> Result<u128, NetworkError>;
    /// Submit a raw signed transaction, returning its hash
    fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, NetworkError>;
}
