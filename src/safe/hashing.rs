//! Structured-data hashing for account transactions
//!
//! Pure functions; the same inputs always produce the same 32-byte output.
//!
//! Derivations:
//! - `domain_hash  = keccak256(abi.encode(DOMAIN_TYPEHASH, chainId, verifyingContract))`
//! - `message_hash = keccak256(abi.encode(SAFE_TX_TYPEHASH, to, value, keccak256(data),
//!   operation, safeTxGas, baseGas, gasPrice, gasToken, refundReceiver, nonce))`
//! - `transaction_hash = keccak256(prefix || domain_hash || message_hash)`
//!
//! The domain hash used for signing is read from the account contract; the
//! local derivation exists to cross-check that value and for tests.

use alloy_primitives::{b256, Address, B256, U256};
use alloy_sol_types::SolValue;

use super::message::SafeMessage;
use crate::crypto::{keccak256, keccak256_concat};

/// Type descriptor of the account transaction struct
pub const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// keccak256(SAFE_TX_TYPE)
pub const SAFE_TX_TYPEHASH: B256 =
    b256!("bb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8");

/// Type descriptor of the signing domain
pub const DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";

/// keccak256(DOMAIN_TYPE)
pub const DOMAIN_TYPEHASH: B256 =
    b256!("47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218");

/// The standard structured-data signing prefix
pub const DEFAULT_SIGN_MAGIC: [u8; 2] = [0x19, 0x01];

/// ABI encoding of the message struct, typehash first
///
/// Every member is a static 32-byte word, so this is the plain concatenation
/// of the words in declaration order. The dynamic `data` member is replaced by
/// its Keccak-256 hash as the typed-data scheme requires.
pub fn encode_message(message: &SafeMessage) -> Vec<u8> {
    (
        SAFE_TX_TYPEHASH,
        message.to,
        message.value,
        keccak256(&message.data),
        U256::from(message.operation.as_u8()),
        message.safe_tx_gas,
        message.base_gas,
        message.gas_price,
        message.gas_token,
        message.refund_receiver,
        message.nonce,
    )
        .abi_encode()
}

/// Hash of the structured message fields
pub fn message_hash(message: &SafeMessage) -> B256 {
    keccak256(encode_message(message))
}

/// Local derivation of the domain hash for `verifying_contract` on `chain_id`
pub fn domain_hash(chain_id: u64, verifying_contract: Address) -> B256 {
    keccak256((DOMAIN_TYPEHASH, U256::from(chain_id), verifying_contract).abi_encode())
}

/// Aggregation key: keccak256(prefix || domain_hash || message_hash)
pub fn transaction_hash(prefix: &[u8], domain_hash: &B256, message_hash: &B256) -> B256 {
    keccak256_concat(&[prefix, domain_hash.as_slice(), message_hash.as_slice()])
}
