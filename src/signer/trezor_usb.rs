//! Trezor sessions over USB through `trezor-client`

use alloy_primitives::{Address, B256, U256};
use serde_json::Value;
use std::str::FromStr;
use trezor_client::protos::ethereum_typed_data_struct_ack::{
    EthereumDataType, EthereumFieldType, EthereumStructMember,
};
use trezor_client::protos::{self, MessageType};
use trezor_client::transport::ProtoMessage;
use trezor_client::{Trezor, TrezorMessage};

use super::derivation::DerivationPath;
use super::eip712::{FieldKind, TypedDocument};
use super::session::Device;
use super::trezor::{parity_from_eip155, quantity_bytes, TrezorConnector, TrezorSession};
use super::SignerError;
use crate::crypto::Signature;
use crate::tx::{SignatureComponents, UnsignedRelayTx};

fn communication(e: trezor_client::Error) -> SignerError {
    SignerError::DeviceCommunication(e.to_string())
}

fn device_error(e: trezor_client::Error) -> SignerError {
    SignerError::DeviceIo(e.to_string())
}

fn decode<M: TrezorMessage>(message: ProtoMessage) -> Result<M, SignerError> {
    message
        .into_message()
        .map_err(|e| SignerError::DeviceIo(format!("undecodable reply: {}", e)))
}

/// Opens the single Trezor plugged in over USB
#[derive(Clone, Copy, Debug, Default)]
pub struct TrezorUsbConnector;

impl TrezorConnector for TrezorUsbConnector {
    fn connect(&self) -> Result<Box<dyn TrezorSession>, SignerError> {
        let mut client = trezor_client::unique(false).map_err(communication)?;
        client.init_device(None).map_err(communication)?;
        log::debug!("Connected to {}", client.model());
        Ok(Box::new(TrezorUsbSession {
            client: Some(client),
        }))
    }
}

/// An open USB connection to a Trezor
pub struct TrezorUsbSession {
    client: Option<Trezor>,
}

impl TrezorUsbSession {
    fn client(&mut self) -> Result<&mut Trezor, SignerError> {
        self.client
            .as_mut()
            .ok_or_else(|| SignerError::DeviceCommunication("session closed".to_string()))
    }

    /// Send one message and return the first reply that is not a prompt
    fn exchange<S: TrezorMessage>(&mut self, message: S) -> Result<ProtoMessage, SignerError> {
        let client = self.client()?;
        let mut reply = client.call_raw(message).map_err(communication)?;
        loop {
            match reply.message_type() {
                MessageType::MessageType_ButtonRequest => {
                    log::info!("Confirm on the Trezor");
                    reply = client
                        .call_raw(protos::ButtonAck::new())
                        .map_err(communication)?;
                }
                MessageType::MessageType_PassphraseRequest => {
                    let mut ack = protos::PassphraseAck::new();
                    ack.set_on_device(true);
                    reply = client.call_raw(ack).map_err(communication)?;
                }
                MessageType::MessageType_PinMatrixRequest => {
                    return Err(SignerError::DeviceCommunication(
                        "unlock the Trezor and retry".to_string(),
                    ));
                }
                MessageType::MessageType_Failure => {
                    let failure: protos::Failure = decode(reply)?;
                    return Err(SignerError::DeviceIo(failure.message().to_string()));
                }
                _ => return Ok(reply),
            }
        }
    }
}

fn typed_data_signature(reply: ProtoMessage) -> Result<Signature, SignerError> {
    if reply.message_type() != MessageType::MessageType_EthereumTypedDataSignature {
        return Err(SignerError::DeviceIo(format!(
            "unexpected reply {:?}",
            reply.message_type()
        )));
    }
    let signature: protos::EthereumTypedDataSignature = decode(reply)?;
    Signature::from_bytes(signature.signature()).map_err(SignerError::from)
}

fn field_type(kind: &FieldKind) -> EthereumFieldType {
    let mut field = EthereumFieldType::new();
    match kind {
        FieldKind::Uint(width) => {
            field.set_data_type(EthereumDataType::UINT);
            field.set_size(*width);
        }
        FieldKind::Int(width) => {
            field.set_data_type(EthereumDataType::INT);
            field.set_size(*width);
        }
        FieldKind::Bytes(width) => {
            field.set_data_type(EthereumDataType::BYTES);
            if let Some(width) = width {
                field.set_size(*width);
            }
        }
        FieldKind::String => field.set_data_type(EthereumDataType::STRING),
        FieldKind::Bool => field.set_data_type(EthereumDataType::BOOL),
        FieldKind::Address => field.set_data_type(EthereumDataType::ADDRESS),
        FieldKind::Array { entry, size } => {
            field.set_data_type(EthereumDataType::ARRAY);
            if let Some(size) = size {
                field.set_size(*size);
            }
            field.entry_type = Some(field_type(entry)).into();
        }
        FieldKind::Struct { name, members } => {
            field.set_data_type(EthereumDataType::STRUCT);
            field.set_size(*members);
            field.set_struct_name(name.clone());
        }
    }
    field
}

impl Device for TrezorUsbSession {
    fn close(&mut self) {
        // Dropping the client releases the USB interface
        self.client.take();
    }
}

impl TrezorSession for TrezorUsbSession {
    fn get_address(&mut self, path: &DerivationPath) -> Result<Address, SignerError> {
        let text = self
            .client()?
            .ethereum_get_address(path.elements().to_vec())
            .map_err(device_error)?;
        Address::from_str(&text).map_err(|e| SignerError::DeviceIo(format!("{}: {}", text, e)))
    }

    fn sign_typed_data_hash(
        &mut self,
        path: &DerivationPath,
        domain_hash: &B256,
        message_hash: &B256,
    ) -> Result<Signature, SignerError> {
        let mut request = protos::EthereumSignTypedHash::new();
        request.address_n = path.elements().to_vec();
        request.set_domain_separator_hash(domain_hash.to_vec());
        request.set_message_hash(message_hash.to_vec());
        typed_data_signature(self.exchange(request)?)
    }

    fn sign_typed_data(
        &mut self,
        path: &DerivationPath,
        data: &Value,
    ) -> Result<Signature, SignerError> {
        let document = TypedDocument::new(data)?;

        let mut request = protos::EthereumSignTypedData::new();
        request.address_n = path.elements().to_vec();
        request.set_primary_type(document.primary_type()?.to_string());
        request.set_metamask_v4_compat(true);
        let mut reply = self.exchange(request)?;

        loop {
            match reply.message_type() {
                MessageType::MessageType_EthereumTypedDataStructRequest => {
                    let wanted: protos::EthereumTypedDataStructRequest = decode(reply)?;
                    log::debug!("Trezor asks for struct {}", wanted.name());

                    let mut ack = protos::EthereumTypedDataStructAck::new();
                    for (name, kind) in document.struct_members(wanted.name())? {
                        let mut member = EthereumStructMember::new();
                        member.set_name(name);
                        member.type_ = Some(field_type(&kind)).into();
                        ack.members.push(member);
                    }
                    reply = self.exchange(ack)?;
                }
                MessageType::MessageType_EthereumTypedDataValueRequest => {
                    let wanted: protos::EthereumTypedDataValueRequest = decode(reply)?;
                    log::debug!("Trezor asks for value {:?}", wanted.member_path);

                    let mut ack = protos::EthereumTypedDataValueAck::new();
                    ack.set_value(document.encode_member(&wanted.member_path)?);
                    reply = self.exchange(ack)?;
                }
                _ => return typed_data_signature(reply),
            }
        }
    }

    fn sign_tx_eip1559(
        &mut self,
        path: &DerivationPath,
        tx: &UnsignedRelayTx,
    ) -> Result<SignatureComponents, SignerError> {
        let signature = self
            .client()?
            .ethereum_sign_eip1559_tx(
                path.elements().to_vec(),
                quantity_bytes(U256::from(tx.nonce)),
                quantity_bytes(U256::from(tx.gas)),
                tx.to.to_checksum(None),
                quantity_bytes(tx.value),
                tx.data.to_vec(),
                Some(tx.chain_id),
                quantity_bytes(U256::from(tx.max_fee_per_gas)),
                quantity_bytes(U256::from(tx.max_priority_fee_per_gas)),
                Vec::new(),
            )
            .map_err(device_error)?;

        Ok(SignatureComponents::new(
            parity_from_eip155(signature.v, tx.chain_id),
            U256::from_be_bytes(signature.r),
            U256::from_be_bytes(signature.s),
        ))
    }
}
