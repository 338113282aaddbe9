//! Relay transactions
//!
//! Building the `execTransaction` call for a relayer, encoding it as an
//! EIP-1559 envelope and getting it signed.

pub mod builder;
pub mod encoding;
pub mod relay;

pub use builder::{
    exec_transaction_calldata, FeePolicy, GasPolicy, RelayPolicy, TransactionBuilder,
    UnsignedRelayTx,
};
pub use encoding::{
    encode_signed, signing_hash, signing_payload, SignatureComponents, SignedRelayTx,
    EIP1559_TX_TYPE,
};
pub use relay::RelayTransactionSigner;
