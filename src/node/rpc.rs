//! Blocking JSON-RPC node client
//!
//! Implements [`NodeClient`] with the standard `eth_*` methods and
//! [`SafeAccount`] by `eth_call`-ing the account contract's view functions.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use super::{CallRequest, NetworkError, NodeClient, SafeAccount};
use crate::safe::abi::ISafe;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client over HTTP
#[derive(Clone, Debug)]
pub struct JsonRpcClient {
    url: String,
    http: Client,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, NetworkError> {
        let http = Client::builder()
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform one request and return the raw `result` member
    pub fn request(&self, method: &str, params: Value) -> Result<Value, NetworkError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        log::debug!("rpc -> {}", method);
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| NetworkError::Transport(e.to_string()))?
            .json()
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(NetworkError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| NetworkError::InvalidResponse(format!("{}: missing result", method)))
    }

    /// `eth_call` against the latest block
    pub fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, NetworkError> {
        let result = self.request(
            "eth_call",
            json!([{ "to": to, "data": Bytes::from(data) }, "latest"]),
        )?;
        parse_bytes(&result)
    }

    fn call_contract<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, NetworkError> {
        let output = self.call(to, call.abi_encode())?;
        C::abi_decode_returns(&output, true)
            .map_err(|e| NetworkError::InvalidResponse(format!("{}: {}", C::SIGNATURE, e)))
    }
}

impl NodeClient for JsonRpcClient {
    fn transaction_count(&self, address: Address) -> Result<u64, NetworkError> {
        let result = self.request("eth_getTransactionCount", json!([address, "latest"]))?;
        to_u64(parse_quantity(&result)?)
    }

    fn estimate_gas(&self, request: &CallRequest) -> Result<u64, NetworkError> {
        let result = self.request(
            "eth_estimateGas",
            json!([{
                "from": request.from,
                "to": request.to,
                "value": format!("{:#x}", request.value),
                "data": request.data,
            }]),
        )?;
        to_u64(parse_quantity(&result)?)
    }

    fn gas_price(&self) -> Result<u128, NetworkError> {
        let result = self.request("eth_gasPrice", json!([]))?;
        u128::try_from(parse_quantity(&result)?)
            .map_err(|_| NetworkError::InvalidResponse("gas price overflows u128".to_string()))
    }

    fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, NetworkError> {
        let result = self.request("eth_sendRawTransaction", json!([raw]))?;
        let text = result
            .as_str()
            .ok_or_else(|| NetworkError::InvalidResponse("transaction hash is not a string".into()))?;
        B256::from_str(text).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
    }
}

/// The account contract read through a [`JsonRpcClient`]
#[derive(Clone, Debug)]
pub struct RpcSafeAccount {
    client: JsonRpcClient,
    address: Address,
}

impl RpcSafeAccount {
    pub fn new(client: JsonRpcClient, address: Address) -> Self {
        Self { client, address }
    }
}

impl SafeAccount for RpcSafeAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn threshold(&self) -> Result<u64, NetworkError> {
        let ret = self
            .client
            .call_contract(self.address, ISafe::getThresholdCall {})?;
        to_u64(ret.threshold)
    }

    fn owners(&self) -> Result<Vec<Address>, NetworkError> {
        let ret = self
            .client
            .call_contract(self.address, ISafe::getOwnersCall {})?;
        Ok(ret.owners)
    }

    fn is_owner(&self, address: Address) -> Result<bool, NetworkError> {
        let ret = self
            .client
            .call_contract(self.address, ISafe::isOwnerCall { owner: address })?;
        Ok(ret.isOwner)
    }

    fn nonce(&self) -> Result<U256, NetworkError> {
        let ret = self.client.call_contract(self.address, ISafe::nonceCall {})?;
        Ok(ret.nonce)
    }

    fn chain_id(&self) -> Result<u64, NetworkError> {
        let ret = self
            .client
            .call_contract(self.address, ISafe::getChainIdCall {})?;
        to_u64(ret.chainId)
    }

    fn domain_separator(&self) -> Result<B256, NetworkError> {
        let ret = self
            .client
            .call_contract(self.address, ISafe::domainSeparatorCall {})?;
        Ok(ret.separator)
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(value: &Value) -> Result<U256, NetworkError> {
    let text = value
        .as_str()
        .ok_or_else(|| NetworkError::InvalidResponse(format!("expected quantity, got {}", value)))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| NetworkError::InvalidResponse(format!("quantity without 0x: {}", text)))?;
    U256::from_str_radix(digits, 16).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
}

fn parse_bytes(value: &Value) -> Result<Bytes, NetworkError> {
    let text = value
        .as_str()
        .ok_or_else(|| NetworkError::InvalidResponse(format!("expected data, got {}", value)))?;
    Bytes::from_str(text).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
}

fn to_u64(value: U256) -> Result<u64, NetworkError> {
    u64::try_from(value)
        .map_err(|_| NetworkError::InvalidResponse(format!("{} does not fit in u64", value)))
}
