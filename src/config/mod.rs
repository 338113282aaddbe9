//! Operator configuration
//!
//! A single TOML file names the accounts, the owners who sign, the relayers
//! who submit, the transaction to approve and the relay gas settings:
//!
//! ```toml
//! safes = [{ name = "treasury", address = "0x..." }]
//! signers = [
//!     { name = "alice", address = "0x...", wallet = "L", index = 0 },
//!     { name = "bob", address = "0x...", wallet = "HOT", key_name = "BOB_KEY" },
//! ]
//! relayers = [{ name = "ops", address = "0x...", wallet = "T", index = 2 }]
//! to = "0x..."
//! raw_data = "0x"
//! operation = 0
//! gas = 0
//! max_fee_per_gas = 0
//! max_priority_fee_per_gas = 1000000000
//!
//! [constants]
//! sign_magic = "0x1901"
//! ```

use alloy_primitives::{address, Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::safe::{Operation, SafeTxParams, DEFAULT_SIGN_MAGIC};
use crate::tx::{FeePolicy, GasPolicy, RelayPolicy, EIP1559_TX_TYPE};

/// The only contract a DELEGATECALL may target
pub const MULTI_SEND_CALL_ONLY: Address = address!("A1dabEF33b3B82c7814B6D82A79e50F4AC44102B");

/// Environment variable consulted when the file has no `rpc_url`
pub const RPC_URL_ENV: &str = "HTTP_PROVIDER";

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "safe-signer.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("No {kind} named {name}")]
    NotFound { kind: &'static str, name: String },
}

/// A named multisig account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub name: String,
    pub address: Address,
}

/// Key source of a signer or relayer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletKind {
    #[serde(rename = "HOT")]
    Hot,
    #[serde(rename = "L")]
    Ledger,
    #[serde(rename = "1")]
    TrezorOne,
    #[serde(rename = "T")]
    TrezorT,
}

impl WalletKind {
    pub fn is_hardware(self) -> bool {
        !matches!(self, WalletKind::Hot)
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletKind::Hot => write!(f, "hot wallet"),
            WalletKind::Ledger => write!(f, "Ledger"),
            WalletKind::TrezorOne => write!(f, "Trezor One"),
            WalletKind::TrezorT => write!(f, "Trezor T"),
        }
    }
}

/// A signer or relayer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntry {
    pub name: String,
    pub address: Address,
    pub wallet: WalletKind,
    /// Derivation index for hardware wallets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Environment variable holding the private key of a hot wallet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
}

/// Rarely changed message and relay parameters
///
/// Amounts are in wei. TOML integers are signed 64-bit, so each field is
/// read as `u64` and widened afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constants {
    /// Prefix of the aggregation key preimage
    pub sign_magic: Bytes,
    pub value_safe_tx: u64,
    pub safe_tx_gas: u64,
    pub base_gas: u64,
    pub gas_price: u64,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub value_relay_tx: u64,
    pub tx_type: u8,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            sign_magic: Bytes::from_static(&DEFAULT_SIGN_MAGIC),
            value_safe_tx: 0,
            safe_tx_gas: 0,
            base_gas: 0,
            gas_price: 0,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            value_relay_tx: 0,
            tx_type: EIP1559_TX_TYPE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub safes: Vec<AccountEntry>,
    #[serde(default)]
    pub signers: Vec<SignerEntry>,
    #[serde(default)]
    pub relayers: Vec<SignerEntry>,
    /// Call target of the account transaction
    pub to: Address,
    #[serde(default)]
    pub raw_data: Bytes,
    #[serde(default)]
    pub operation: u8,
    /// Relay gas limit, 0 to estimate
    #[serde(default)]
    pub gas: u64,
    /// Relay max fee, 0 for gas price plus priority fee
    #[serde(default)]
    pub max_fee_per_gas: u64,
    #[serde(default)]
    pub max_priority_fee_per_gas: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub constants: Constants,
}

impl Config {
    /// Read, parse and validate the file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!(
            "Loaded {:?}: {} safe(s), {} signer(s), {} relayer(s)",
            path,
            config.safes.len(),
            config.signers.len(),
            config.relayers.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self
            .safes
            .iter()
            .map(|s| &s.name)
            .chain(self.signers.iter().map(|s| &s.name))
            .chain(self.relayers.iter().map(|s| &s.name))
        {
            if name.contains('(') || name.contains(')') {
                return Err(invalid(format!(
                    "name {:?} can't contain characters '(' or ')'",
                    name
                )));
            }
        }

        let operation = Operation::try_from(self.operation)
            .map_err(|_| invalid("operation must be 0 or 1"))?;
        if operation == Operation::DelegateCall && self.to != MULTI_SEND_CALL_ONLY {
            return Err(invalid(format!(
                "to-address must always be {} for operation 1",
                MULTI_SEND_CALL_ONLY
            )));
        }

        check_unique(&self.signers, "signing")?;
        check_unique(&self.relayers, "relayer")?;
        for entry in self.signers.iter().chain(&self.relayers) {
            check_key_source(entry)?;
        }

        if self.constants.sign_magic.is_empty() {
            return Err(invalid("sign_magic must not be empty"));
        }
        if self.constants.tx_type != EIP1559_TX_TYPE {
            return Err(invalid(format!(
                "tx_type {} is not supported, only {}",
                self.constants.tx_type, EIP1559_TX_TYPE
            )));
        }
        Ok(())
    }

    /// Look up an account by name or address
    pub fn safe(&self, key: &str) -> Result<&AccountEntry, ConfigError> {
        self.safes
            .iter()
            .find(|s| matches_entry(&s.name, s.address, key))
            .ok_or_else(|| not_found("safe", key))
    }

    pub fn signer(&self, key: &str) -> Result<&SignerEntry, ConfigError> {
        self.signers
            .iter()
            .find(|s| matches_entry(&s.name, s.address, key))
            .ok_or_else(|| not_found("signer", key))
    }

    pub fn relayer(&self, key: &str) -> Result<&SignerEntry, ConfigError> {
        self.relayers
            .iter()
            .find(|s| matches_entry(&s.name, s.address, key))
            .ok_or_else(|| not_found("relayer", key))
    }

    pub fn operation(&self) -> Result<Operation, ConfigError> {
        Operation::try_from(self.operation).map_err(|_| invalid("operation must be 0 or 1"))
    }

    /// Message fields of the account transaction, nonce excluded
    pub fn safe_tx_params(&self) -> Result<SafeTxParams, ConfigError> {
        let c = &self.constants;
        Ok(SafeTxParams {
            to: self.to,
            value: U256::from(c.value_safe_tx),
            data: self.raw_data.clone(),
            operation: self.operation()?,
            safe_tx_gas: U256::from(c.safe_tx_gas),
            base_gas: U256::from(c.base_gas),
            gas_price: U256::from(c.gas_price),
            gas_token: c.gas_token,
            refund_receiver: c.refund_receiver,
        })
    }

    pub fn relay_policy(&self) -> RelayPolicy {
        RelayPolicy {
            gas: GasPolicy::fixed(self.gas),
            fees: FeePolicy::new(
                u128::from(self.max_fee_per_gas),
                u128::from(self.max_priority_fee_per_gas),
            ),
            value: U256::from(self.constants.value_relay_tx),
            tx_type: self.constants.tx_type,
        }
    }

    /// Node endpoint from the file, or from [`RPC_URL_ENV`]
    pub fn rpc_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.clone());
        }
        std::env::var(RPC_URL_ENV).map_err(|_| {
            invalid(format!("rpc_url is not set and {} is empty", RPC_URL_ENV))
        })
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn not_found(kind: &'static str, name: &str) -> ConfigError {
    ConfigError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn matches_entry(name: &str, address: Address, key: &str) -> bool {
    name == key || key.parse::<Address>().map_or(false, |a| a == address)
}

fn check_unique(entries: &[SignerEntry], role: &str) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.address) {
            return Err(invalid(format!("all {} addresses must be unique", role)));
        }
    }
    Ok(())
}

fn check_key_source(entry: &SignerEntry) -> Result<(), ConfigError> {
    if entry.wallet.is_hardware() && entry.index.is_none() {
        return Err(invalid(format!(
            "{} uses a {} and needs an index",
            entry.name, entry.wallet
        )));
    }
    if entry.wallet == WalletKind::Hot && entry.key_name.is_none() {
        return Err(invalid(format!(
            "{} uses a hot wallet and needs a key_name",
            entry.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        safes = [{ name = "treasury", address = "0x1234567890123456789012345678901234567890" }]
        signers = [
            { name = "alice", address = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", wallet = "L", index = 0 },
            { name = "bob", address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", wallet = "HOT", key_name = "BOB_KEY" },
        ]
        relayers = [
            { name = "ops", address = "0xcccccccccccccccccccccccccccccccccccccccc", wallet = "T", index = 2 },
        ]
        to = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        raw_data = "0xa9059cbb"
        operation = 0
        gas = 0
        max_fee_per_gas = 0
        max_priority_fee_per_gas = 1000000000
    "#;

    #[test]
    fn test_parse_with_default_constants() {
        let config = Config::from_toml_str(BASE).unwrap();

        assert_eq!(config.signers[0].wallet, WalletKind::Ledger);
        assert_eq!(config.signers[1].wallet, WalletKind::Hot);
        assert_eq!(config.relayers[0].wallet, WalletKind::TrezorT);
        assert_eq!(config.raw_data, Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb]));
        assert_eq!(config.constants, Constants::default());
        assert_eq!(config.constants.sign_magic.to_vec(), vec![0x19, 0x01]);

        let params = config.safe_tx_params().unwrap();
        assert_eq!(params.operation, Operation::Call);
        assert_eq!(params.data, config.raw_data);

        let policy = config.relay_policy();
        assert!(policy.gas.is_estimate());
        assert_eq!(policy.fees.max_priority_fee_per_gas, 1_000_000_000);
    }

    #[test]
    fn test_constants_table() {
        let toml = format!(
            "{}\n[constants]\nsign_magic = \"0x1900\"\nsafe_tx_gas = 5000\nvalue_relay_tx = 7\n",
            BASE
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.constants.sign_magic.to_vec(), vec![0x19, 0x00]);
        assert_eq!(
            config.safe_tx_params().unwrap().safe_tx_gas,
            U256::from(5000)
        );
        assert_eq!(config.relay_policy().value, U256::from(7));
    }

    #[test]
    fn test_lookup_by_name_or_address() {
        let config = Config::from_toml_str(BASE).unwrap();
        assert_eq!(config.signer("alice").unwrap().index, Some(0));
        assert_eq!(
            config
                .signer("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
                .unwrap()
                .name,
            "bob"
        );
        assert_eq!(config.safe("treasury").unwrap().name, "treasury");
        assert!(matches!(
            config.relayer("alice"),
            Err(ConfigError::NotFound { kind: "relayer", .. })
        ));
    }

    #[test]
    fn test_rejects_parenthesis_in_names() {
        let toml = BASE.replace("\"alice\"", "\"alice (ledger)\"");
        assert!(matches!(
            Config::from_toml_str(&toml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_bad_operation() {
        let toml = BASE.replace("operation = 0", "operation = 2");
        assert!(matches!(
            Config::from_toml_str(&toml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_delegatecall_requires_multisend() {
        let toml = BASE.replace("operation = 0", "operation = 1");
        assert!(Config::from_toml_str(&toml).is_err());

        let toml = toml.replace(
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23",
            "0xA1dabEF33b3B82c7814B6D82A79e50F4AC44102B",
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.operation().unwrap(), Operation::DelegateCall);
    }

    #[test]
    fn test_rejects_duplicate_signers() {
        let toml = BASE.replace(
            "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        );
        assert!(matches!(
            Config::from_toml_str(&toml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_requires_key_source() {
        let toml = BASE.replace(", index = 2", "");
        assert!(Config::from_toml_str(&toml).is_err());

        let toml = BASE.replace(", key_name = \"BOB_KEY\"", "");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_unknown_wallet_kind() {
        let toml = BASE.replace("wallet = \"T\"", "wallet = \"X\"");
        assert!(matches!(
            Config::from_toml_str(&toml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, BASE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.safes.len(), 1);
        assert!(matches!(
            Config::load(temp_dir.path().join("missing.toml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
