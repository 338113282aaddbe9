//! Trezor backends
//!
//! Both models share the session interface. Trezor One signs typed data
//! from a precomputed hash pair; Trezor T needs the whole typed-data document.
//! Both sign fee-market transactions and return bare signature components.

use alloy_primitives::{Address, B256, U256};
use serde_json::Value;

use super::derivation::DerivationPath;
use super::session::{Device, DeviceSession};
use super::{check_address, SignerError};
use crate::crypto::Signature;
use crate::safe::SafeTypedData;
use crate::tx::{SignatureComponents, UnsignedRelayTx};

/// An open Trezor connection
pub trait TrezorSession: Device {
    fn get_address(&mut self, path: &DerivationPath) -> Result<Address, SignerError>;

    fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_hash: &B256,
        message_hash: &B256,
    ) -> Result<Signature, SignerError>;

    /// Sign a full `eth_signTypedData_v4` document
    fn sign_typed_data(
        &mut self,
        path: &DerivationPath,
        data: &Value,
    ) -> Result<Signature, SignerError>;

    fn sign_tx_eip1559(
        &mut self,
        path: &DerivationPath,
        tx: &UnsignedRelayTx,
    ) -> Result<SignatureComponents, SignerError>;
}

/// Opens Trezor sessions
pub trait TrezorConnector {
    fn connect(&self) -> Result<Box<dyn TrezorSession>, SignerError>;
}

/// Connector for builds without the `trezor-usb` feature
///
/// Every connect attempt fails the way an unplugged device does.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisconnectedTrezor;

impl TrezorConnector for DisconnectedTrezor {
    fn connect(&self) -> Result<Box<dyn TrezorSession>, SignerError> {
        Err(SignerError::DeviceCommunication(
            "built without the trezor-usb feature".to_string(),
        ))
    }
}

/// Minimal big-endian bytes of a quantity, empty for zero
pub fn quantity_bytes(value: U256) -> Vec<u8> {
    let word = value.to_be_bytes::<32>();
    let start = word.iter().position(|b| *b != 0).unwrap_or(word.len());
    word[start..].to_vec()
}

/// Undo the EIP-155 offset the firmware client applies to `v`
///
/// Fee-market envelopes carry the bare 0/1 parity.
pub fn parity_from_eip155(v: u64, chain_id: u64) -> u64 {
    let offset = chain_id.checked_mul(2).and_then(|c| c.checked_add(35));
    match offset {
        Some(offset) if v >= offset => v - offset,
        _ => v,
    }
}

/// Signer backed by a Trezor device, either model
pub struct TrezorSigner {
    connector: Box<dyn TrezorConnector>,
    index: u32,
}

impl TrezorSigner {
    pub fn new(connector: Box<dyn TrezorConnector>, index: u32) -> Self {
        Self { connector, index }
    }

    pub fn path(&self) -> Result<DerivationPath, SignerError> {
        DerivationPath::trezor(self.index)
    }

    /// Open a session and check the device holds `expected` at this path
    fn open_verified(
        &self,
        expected: Address,
    ) -> Result<(DeviceSession<dyn TrezorSession>, DerivationPath), SignerError> {
        let path = self.path()?;
        let mut session = DeviceSession::new(self.connector.connect()?, "Trezor");
        let actual = session.get_address(&path)?;
        check_address(expected, actual)?;
        Ok((session, path))
    }

    pub fn verify_address(&self, expected: Address) -> Result<Address, SignerError> {
        self.open_verified(expected)?;
        Ok(expected)
    }

    pub fn sign_typed_data_hash(
        &self,
        expected: Address,
        domain_hash: &B256,
        message_hash: &B256,
    ) -> Result<Signature, SignerError> {
        let (mut session, path) = self.open_verified(expected)?;
        log::info!("Confirm the signature on the Trezor ({})", path);
        session.sign_typed_data_hash(&path, domain_hash, message_hash)
    }

    pub fn sign_typed_data(
        &self,
        expected: Address,
        data: &SafeTypedData,
    ) -> Result<Signature, SignerError> {
        let (mut session, path) = self.open_verified(expected)?;
        log::info!("Confirm the signature on the Trezor ({})", path);
        session.sign_typed_data(&path, &data.to_json())
    }

    pub fn sign_transaction(
        &self,
        expected: Address,
        tx: &UnsignedRelayTx,
    ) -> Result<SignatureComponents, SignerError> {
        let (mut session, path) = self.open_verified(expected)?;
        log::info!("Confirm the transaction on the Trezor ({})", path);
        session.sign_tx_eip1559(&path, tx)
    }
}
