//! Full structured-data documents for backends that hash on their own

use alloy_primitives::{Address, B256};
use serde_json::{json, Value};

use super::hashing::{domain_hash, message_hash, transaction_hash, DEFAULT_SIGN_MAGIC};
use super::message::SafeMessage;

/// A message together with the domain it is signed under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeTypedData {
    pub message: SafeMessage,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl SafeTypedData {
    pub fn new(message: SafeMessage, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            message,
            chain_id,
            verifying_contract,
        }
    }

    pub fn domain_hash(&self) -> B256 {
        domain_hash(self.chain_id, self.verifying_contract)
    }

    pub fn message_hash(&self) -> B256 {
        message_hash(&self.message)
    }

    /// The digest a wallet signs for this document
    ///
    /// Wallets always apply the standard `0x1901` prefix; it only matches
    /// the session's aggregation key when the configured prefix is standard.
    pub fn signing_hash(&self) -> B256 {
        transaction_hash(&DEFAULT_SIGN_MAGIC, &self.domain_hash(), &self.message_hash())
    }

    /// JSON document in the `eth_signTypedData_v4` shape
    pub fn to_json(&self) -> Value {
        let m = &self.message;
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "SafeTx": [
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "data", "type": "bytes" },
                    { "name": "operation", "type": "uint8" },
                    { "name": "safeTxGas", "type": "uint256" },
                    { "name": "baseGas", "type": "uint256" },
                    { "name": "gasPrice", "type": "uint256" },
                    { "name": "gasToken", "type": "address" },
                    { "name": "refundReceiver", "type": "address" },
                    { "name": "nonce", "type": "uint256" },
                ],
            },
            "primaryType": "SafeTx",
            "domain": {
                "chainId": self.chain_id,
                "verifyingContract": self.verifying_contract.to_checksum(None),
            },
            "message": {
                "to": m.to.to_checksum(None),
                "value": m.value.to_string(),
                "data": m.data.to_string(),
                "operation": m.operation.as_u8(),
                "safeTxGas": m.safe_tx_gas.to_string(),
                "baseGas": m.base_gas.to_string(),
                "gasPrice": m.gas_price.to_string(),
                "gasToken": m.gas_token.to_checksum(None),
                "refundReceiver": m.refund_receiver.to_checksum(None),
                "nonce": m.nonce.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe::message::SafeTxParams;
    use alloy_primitives::{address, b256, Bytes, U256};

    fn sample() -> SafeTypedData {
        let message = SafeTxParams::call(
            address!("2c7536E3605D9C16a7a3D7b1898e529396a65c23"),
            U256::ZERO,
            Bytes::new(),
        )
        .with_nonce(U256::from(7));
        SafeTypedData::new(message, 1, address!("1234567890123456789012345678901234567890"))
    }

    #[test]
    fn test_signing_hash_matches_transaction_hash() {
        assert_eq!(
            sample().signing_hash(),
            b256!("bc2fa793483994f3ef8b45f9587212d7dc31bd256ac973dc69cbe3d996b1366f")
        );
    }

    #[test]
    fn test_json_shape() {
        let doc = sample().to_json();
        assert_eq!(doc["primaryType"], "SafeTx");
        assert_eq!(doc["domain"]["chainId"], 1);
        assert_eq!(
            doc["domain"]["verifyingContract"],
            "0x1234567890123456789012345678901234567890"
        );
        assert_eq!(doc["message"]["nonce"], "7");
        assert_eq!(doc["message"]["data"], "0x");
        assert_eq!(doc["types"]["SafeTx"].as_array().unwrap().len(), 10);
    }
}
