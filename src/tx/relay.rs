//! Relayer signing of relay transactions

use alloy_primitives::Address;

use super::builder::UnsignedRelayTx;
use super::encoding::{encode_signed, SignedRelayTx};
use crate::signer::{Signer, SignerError, TransactionSignature};

/// Drives a [`Signer`] to a broadcastable relay transaction
///
/// Backends that only return signature components get their envelope
/// encoded here; backends that return a finished encoding pass through.
pub struct RelayTransactionSigner<'a> {
    signer: &'a Signer,
    relayer: Address,
}

impl<'a> RelayTransactionSigner<'a> {
    pub fn new(signer: &'a Signer, relayer: Address) -> Self {
        Self { signer, relayer }
    }

    pub fn sign(&self, tx: &UnsignedRelayTx) -> Result<SignedRelayTx, SignerError> {
        let signed = match self.signer.sign_transaction(self.relayer, tx)? {
            TransactionSignature::Encoded(signed) => signed,
            TransactionSignature::Components(components) => encode_signed(tx, &components),
        };
        log::info!("Signed relay transaction {}", signed.hash);
        Ok(signed)
    }
}
