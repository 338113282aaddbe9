//! The structured message approved by the account owners

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::SafeError;

/// Kind of call the account performs when the message executes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operation {
    Call = 0,
    DelegateCall = 1,
}

impl Operation {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = SafeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            other => Err(SafeError::Validation(format!(
                "operation must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        op.as_u8()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Call => write!(f, "CALL"),
            Operation::DelegateCall => write!(f, "DELEGATECALL"),
        }
    }
}

/// Message fields supplied by the operator, everything except the nonce
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeTxParams {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
}

impl SafeTxParams {
    /// A plain call with no refund parameters
    pub fn call(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to,
            value,
            data,
            operation: Operation::Call,
            safe_tx_gas: U256::ZERO,
            base_gas: U256::ZERO,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
        }
    }

    /// Bind the parameters to the account nonce they will execute at
    pub fn with_nonce(self, nonce: U256) -> SafeMessage {
        SafeMessage {
            to: self.to,
            value: self.value,
            data: self.data,
            operation: self.operation,
            safe_tx_gas: self.safe_tx_gas,
            base_gas: self.base_gas,
            gas_price: self.gas_price,
            gas_token: self.gas_token,
            refund_receiver: self.refund_receiver,
            nonce,
        }
    }
}

/// An account transaction awaiting owner approval
///
/// Created once per session and never mutated; every hash and the relay
/// call data are derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeMessage {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}
