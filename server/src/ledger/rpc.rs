//! Ethereum JSON-RPC implementation of [`Ledger`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::ledger::abi;
use crate::ledger::{Ledger, LedgerError, Log, Receipt};

/// Blocking JSON-RPC client. Every request is bounded by `timeout`.
pub struct RpcLedger {
    client: reqwest::blocking::Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    /// Absent on pre-Byzantium receipts.
    status: Option<String>,
    contract_address: Option<String>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    input: String,
}

impl RpcLedger {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(map_http_error)?
            .json()
            .map_err(map_http_error)?;

        if let Some(err) = response.error {
            return Err(LedgerError::Rpc(format!("{} (code {})", err.message, err.code)));
        }
        Ok(response.result)
    }

    fn call(&self, contract: &str, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let params = json!([
            { "to": contract, "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.request("eth_call", params)?;
        let output = result
            .as_str()
            .ok_or_else(|| LedgerError::Malformed("eth_call result is not a string".to_string()))?;
        abi::decode_hex(output)
    }
}

fn map_http_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else if e.is_decode() {
        LedgerError::Malformed(e.to_string())
    } else {
        LedgerError::Transport(e.to_string())
    }
}

fn parse_quantity(value: &str) -> Result<u64, LedgerError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Malformed(format!("invalid quantity '{}': {}", value, e)))
}

fn parse_topic(value: &str) -> Result<[u8; 32], LedgerError> {
    abi::decode_hex(value)?
        .try_into()
        .map_err(|_| LedgerError::Malformed(format!("topic is not 32 bytes: {}", value)))
}

fn parse_address(value: &str) -> Result<String, LedgerError> {
    abi::normalize_address(value)
        .ok_or_else(|| LedgerError::Malformed(format!("invalid address: {}", value)))
}

impl TryFrom<RawReceipt> for Receipt {
    type Error = LedgerError;

    fn try_from(raw: RawReceipt) -> Result<Self, Self::Error> {
        let status = match raw.status.as_deref() {
            Some(s) => parse_quantity(s)?,
            None => 1,
        };
        let contract_address = raw.contract_address.as_deref().map(parse_address).transpose()?;

        let logs = raw
            .logs
            .into_iter()
            .map(|log| {
                Ok(Log {
                    address: parse_address(&log.address)?,
                    topics: log
                        .topics
                        .iter()
                        .map(|t| parse_topic(t))
                        .collect::<Result<_, LedgerError>>()?,
                    data: abi::decode_hex(&log.data)?,
                })
            })
            .collect::<Result<_, LedgerError>>()?;

        Ok(Receipt {
            status,
            contract_address,
            logs,
        })
    }
}

impl Ledger for RpcLedger {
    fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, LedgerError> {
        let result = self.request("eth_getTransactionReceipt", json!([tx_hash]))?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(result)
            .map_err(|e| LedgerError::Malformed(format!("receipt: {}", e)))?;
        Receipt::try_from(raw).map(Some)
    }

    fn transaction_input(&self, tx_hash: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let result = self.request("eth_getTransactionByHash", json!([tx_hash]))?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawTransaction = serde_json::from_value(result)
            .map_err(|e| LedgerError::Malformed(format!("transaction: {}", e)))?;
        abi::decode_hex(&raw.input).map(Some)
    }

    fn seller(&self, contract: &str) -> Result<String, LedgerError> {
        let output = self.call(contract, abi::encode_call(abi::SELLER_SIGNATURE, &[]))?;
        abi::decode_address(&output)
    }

    fn purchased(&self, contract: &str, buyer: &str) -> Result<bool, LedgerError> {
        let buyer = abi::parse_address(buyer)
            .ok_or_else(|| LedgerError::Malformed(format!("invalid buyer address: {}", buyer)))?;
        let data = abi::encode_call(abi::IS_PURCHASED_SIGNATURE, &[abi::address_word(&buyer)]);
        let output = self.call(contract, data)?;
        abi::decode_bool(&output)
    }

    fn sold_out(&self, contract: &str) -> Result<bool, LedgerError> {
        let output = self.call(contract, abi::encode_call(abi::SOLD_OUT_SIGNATURE, &[]))?;
        abi::decode_bool(&output)
    }

    fn for_sale(&self, contract: &str) -> Result<bool, LedgerError> {
        let output = self.call(contract, abi::encode_call(abi::FOR_SALE_SIGNATURE, &[]))?;
        abi::decode_bool(&output)
    }
}
