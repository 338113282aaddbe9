//! EIP-1559 transaction envelope
//!
//! Wire form: `0x02 || rlp([chainId, nonce, maxPriorityFeePerGas,
//! maxFeePerGas, gasLimit, to, value, data, accessList, yParity, r, s])`.
//! The access list is always empty. The signing payload is the same envelope
//! without the three signature fields.

use alloy_primitives::{Bytes, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Encodable, Header};
use std::fmt;

use super::builder::UnsignedRelayTx;
use crate::crypto::{keccak256, ECRECOVER_V_OFFSET};

/// Typed transaction marker of the fee-market envelope
pub const EIP1559_TX_TYPE: u8 = 0x02;

/// Bare signature values as returned by hardware wallets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureComponents {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl SignatureComponents {
    pub fn new(v: u64, r: U256, s: U256) -> Self {
        Self { v, r, s }
    }

    /// `v` as the 0/1 parity the envelope carries
    pub fn y_parity(&self) -> u64 {
        let offset = u64::from(ECRECOVER_V_OFFSET);
        if self.v >= offset {
            self.v - offset
        } else {
            self.v
        }
    }
}

/// A fully encoded, broadcastable relay transaction
#[derive(Clone, PartialEq, Eq)]
pub struct SignedRelayTx {
    pub raw: Bytes,
    pub hash: B256,
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

impl SignedRelayTx {
    /// Wrap already encoded bytes, deriving the hash
    pub fn from_raw(raw: Bytes, signature: SignatureComponents) -> Self {
        let hash = keccak256(&raw);
        Self {
            raw,
            hash,
            r: signature.r,
            s: signature.s,
            v: signature.v,
        }
    }
}

impl fmt::Debug for SignedRelayTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRelayTx")
            .field("hash", &self.hash)
            .field("raw", &self.raw)
            .field("v", &self.v)
            .field("r", &format_args!("{:#x}", self.r))
            .field("s", &format_args!("{:#x}", self.s))
            .finish()
    }
}

fn fields_length(tx: &UnsignedRelayTx) -> usize {
    tx.chain_id.length()
        + tx.nonce.length()
        + tx.max_priority_fee_per_gas.length()
        + tx.max_fee_per_gas.length()
        + tx.gas.length()
        + tx.to.length()
        + tx.value.length()
        + tx.data.length()
        + empty_access_list().length()
}

fn encode_fields(tx: &UnsignedRelayTx, out: &mut dyn BufMut) {
    tx.chain_id.encode(out);
    tx.nonce.encode(out);
    tx.max_priority_fee_per_gas.encode(out);
    tx.max_fee_per_gas.encode(out);
    tx.gas.encode(out);
    tx.to.encode(out);
    tx.value.encode(out);
    tx.data.encode(out);
    empty_access_list().encode(out);
}

fn empty_access_list() -> Header {
    Header {
        list: true,
        payload_length: 0,
    }
}

fn envelope(payload_length: usize, encode: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + length_of_length(payload_length) + payload_length);
    out.push(EIP1559_TX_TYPE);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    encode(&mut out);
    out
}

/// Bytes the relayer key signs over
pub fn signing_payload(tx: &UnsignedRelayTx) -> Vec<u8> {
    envelope(fields_length(tx), |out| encode_fields(tx, out))
}

/// Keccak-256 of the signing payload
pub fn signing_hash(tx: &UnsignedRelayTx) -> B256 {
    keccak256(signing_payload(tx))
}

/// Encode `tx` with its signature into the broadcastable envelope
pub fn encode_signed(tx: &UnsignedRelayTx, signature: &SignatureComponents) -> SignedRelayTx {
    let y_parity = signature.y_parity();
    let payload_length = fields_length(tx)
        + y_parity.length()
        + signature.r.length()
        + signature.s.length();

    let raw = envelope(payload_length, |out| {
        encode_fields(tx, out);
        y_parity.encode(out);
        signature.r.encode(out);
        signature.s.encode(out);
    });

    SignedRelayTx::from_raw(Bytes::from(raw), *signature)
}
