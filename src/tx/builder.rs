//! Relay transaction construction
//!
//! The relay transaction calls `execTransaction` on the account with the
//! approved message and the aggregated owner signatures. Gas limit, fees and
//! nonce come from live node state, so two builds of the same message are
//! not expected to agree.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::fmt;

use super::encoding::EIP1559_TX_TYPE;
use crate::node::{CallRequest, NetworkError, NodeClient};
use crate::safe::abi::ISafe;
use crate::safe::SafeMessage;

/// Gas limit selection; a limit of 0 asks the node for an estimate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: u64,
}

impl GasPolicy {
    pub fn estimate() -> Self {
        Self { gas_limit: 0 }
    }

    pub fn fixed(gas_limit: u64) -> Self {
        Self { gas_limit }
    }

    pub fn is_estimate(&self) -> bool {
        self.gas_limit == 0
    }
}

/// Fee selection; a max fee of 0 means network gas price plus priority fee
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeePolicy {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeePolicy {
    pub fn new(max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }
}

/// Everything about a relay transaction the operator chooses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayPolicy {
    pub gas: GasPolicy,
    pub fees: FeePolicy,
    /// Native value sent along with the relay transaction
    pub value: U256,
    pub tx_type: u8,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            gas: GasPolicy::estimate(),
            fees: FeePolicy::default(),
            value: U256::ZERO,
            tx_type: EIP1559_TX_TYPE,
        }
    }
}

/// A fee-market transaction ready for the relayer to sign
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedRelayTx {
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub chain_id: u64,
    pub tx_type: u8,
}

impl fmt::Display for UnsignedRelayTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  type:                 {}", self.tx_type)?;
        writeln!(f, "  chainId:              {}", self.chain_id)?;
        writeln!(f, "  nonce:                {}", self.nonce)?;
        writeln!(f, "  to:                   {}", self.to)?;
        writeln!(f, "  value:                {}", self.value)?;
        writeln!(f, "  gas:                  {}", self.gas)?;
        writeln!(f, "  maxFeePerGas:         {}", self.max_fee_per_gas)?;
        writeln!(f, "  maxPriorityFeePerGas: {}", self.max_priority_fee_per_gas)?;
        write!(f, "  data:                 {}", self.data)
    }
}

/// Call data of `execTransaction(message..., signatures)`
pub fn exec_transaction_calldata(message: &SafeMessage, signatures: &Bytes) -> Bytes {
    ISafe::execTransactionCall {
        to: message.to,
        value: message.value,
        data: message.data.clone(),
        operation: message.operation.as_u8(),
        safeTxGas: message.safe_tx_gas,
        baseGas: message.base_gas,
        gasPrice: message.gas_price,
        gasToken: message.gas_token,
        refundReceiver: message.refund_receiver,
        signatures: signatures.clone(),
    }
    .abi_encode()
    .into()
}

/// Builder for relay transactions against one account
pub struct TransactionBuilder {
    safe: Address,
    chain_id: u64,
    value: U256,
    tx_type: u8,
    gas: GasPolicy,
    fees: FeePolicy,
}

impl TransactionBuilder {
    pub fn new(safe: Address, chain_id: u64) -> Self {
        Self {
            safe,
            chain_id,
            value: U256::ZERO,
            tx_type: EIP1559_TX_TYPE,
            gas: GasPolicy::estimate(),
            fees: FeePolicy::default(),
        }
    }

    /// Native value attached to the relay transaction
    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn tx_type(mut self, tx_type: u8) -> Self {
        self.tx_type = tx_type;
        self
    }

    pub fn gas(mut self, policy: GasPolicy) -> Self {
        self.gas = policy;
        self
    }

    pub fn fees(mut self, policy: FeePolicy) -> Self {
        self.fees = policy;
        self
    }

    pub fn policy(self, policy: &RelayPolicy) -> Self {
        self.gas(policy.gas)
            .fees(policy.fees)
            .value(policy.value)
            .tx_type(policy.tx_type)
    }

    /// Resolve nonce, gas and fees against `node` and assemble the transaction
    pub fn build(
        &self,
        node: &dyn NodeClient,
        message: &SafeMessage,
        signatures: &Bytes,
        relayer: Address,
    ) -> Result<UnsignedRelayTx, NetworkError> {
        let data = exec_transaction_calldata(message, signatures);
        let nonce = node.transaction_count(relayer)?;

        let gas = if self.gas.is_estimate() {
            let estimate = node.estimate_gas(&CallRequest {
                from: relayer,
                to: self.safe,
                value: self.value,
                data: data.clone(),
            })?;
            log::debug!("Estimated gas limit {}", estimate);
            estimate
        } else {
            log::debug!("Using configured gas limit {}", self.gas.gas_limit);
            self.gas.gas_limit
        };

        let max_fee_per_gas = if self.fees.max_fee_per_gas == 0 {
            let gas_price = node.gas_price()?;
            let fee = gas_price.saturating_add(self.fees.max_priority_fee_per_gas);
            log::debug!(
                "Max fee {} from gas price {} plus priority fee {}",
                fee,
                gas_price,
                self.fees.max_priority_fee_per_gas
            );
            fee
        } else {
            self.fees.max_fee_per_gas
        };

        Ok(UnsignedRelayTx {
            nonce,
            to: self.safe,
            value: self.value,
            data,
            gas,
            max_fee_per_gas,
            max_priority_fee_per_gas: self.fees.max_priority_fee_per_gas,
            chain_id: self.chain_id,
            tx_type: self.tx_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::FakeNode;
    use crate::safe::SafeTxParams;

    fn message() -> SafeMessage {
        SafeTxParams::call(Address::repeat_byte(0x11), U256::ZERO, Bytes::new())
            .with_nonce(U256::from(3))
    }

    fn node() -> FakeNode {
        FakeNode {
            transaction_count: 12,
            gas_estimate: 55_555,
            gas_price: 30_000_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_calldata_starts_with_selector() {
        let data = exec_transaction_calldata(&message(), &Bytes::from_static(&[0xab; 65]));
        assert_eq!(&data[..4], &ISafe::execTransactionCall::SELECTOR);

        let decoded = ISafe::execTransactionCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.to, Address::repeat_byte(0x11));
        assert_eq!(decoded.signatures.len(), 65);
    }

    #[test]
    fn test_explicit_gas_and_fee() {
        let node = node();
        let safe = Address::repeat_byte(0x5a);
        let tx = TransactionBuilder::new(safe, 1)
            .gas(GasPolicy::fixed(100_000))
            .fees(FeePolicy::new(50_000_000_000, 2_000_000_000))
            .build(&node, &message(), &Bytes::new(), Address::repeat_byte(0x77))
            .unwrap();

        assert_eq!(tx.gas, 100_000);
        assert_eq!(tx.max_fee_per_gas, 50_000_000_000);
        assert_eq!(tx.max_priority_fee_per_gas, 2_000_000_000);
        assert_eq!(tx.nonce, 12);
        assert_eq!(tx.to, safe);
        assert_eq!(tx.tx_type, EIP1559_TX_TYPE);
        assert_eq!(node.estimate_calls.get(), 0);
        assert_eq!(node.gas_price_calls.get(), 0);
    }

    #[test]
    fn test_estimated_gas_and_derived_fee() {
        let node = node();
        let relayer = Address::repeat_byte(0x77);
        let tx = TransactionBuilder::new(Address::repeat_byte(0x5a), 5)
            .value(U256::from(9))
            .fees(FeePolicy::new(0, 2_000_000_000))
            .build(&node, &message(), &Bytes::new(), relayer)
            .unwrap();

        assert_eq!(tx.gas, 55_555);
        assert_eq!(tx.max_fee_per_gas, 32_000_000_000);
        assert_eq!(tx.chain_id, 5);
        assert_eq!(node.estimate_calls.get(), 1);

        let request = node.last_estimate.borrow().clone().unwrap();
        assert_eq!(request.from, relayer);
        assert_eq!(request.value, U256::from(9));
        assert_eq!(request.data, tx.data);
    }
}
