//! Minimal contract ABI helpers: selectors, 32-byte words, and addresses.

use sha3::{Digest, Keccak256};

use crate::ledger::LedgerError;

/// Signature of the event a sale contract emits on purchase.
pub const PURCHASE_EVENT_SIGNATURE: &str = "Purchase(address,uint256)";

pub const SELLER_SIGNATURE: &str = "seller()";
pub const IS_PURCHASED_SIGNATURE: &str = "isPurchased(address)";
pub const SOLD_OUT_SIGNATURE: &str = "soldOut()";
pub const FOR_SALE_SIGNATURE: &str = "forSale()";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// First four bytes of the Keccak-256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic hash of the purchase event.
pub fn purchase_event_topic() -> [u8; 32] {
    keccak256(PURCHASE_EVENT_SIGNATURE.as_bytes())
}

/// Call data for `signature` applied to already-encoded word arguments.
pub fn encode_call(signature: &str, args: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(arg);
    }
    data
}

/// Left-pad an address into a 32-byte word.
pub fn address_word(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

/// Decode hex with or without a `0x` prefix.
pub fn decode_hex(value: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| LedgerError::Malformed(format!("invalid hex '{}': {}", value, e)))
}

/// Parse a `0x`-prefixed 20-byte address, any letter case.
pub fn parse_address(address: &str) -> Option<[u8; 20]> {
    if !is_valid_address(address) {
        return None;
    }
    hex::decode(&address[2..]).ok()?.try_into().ok()
}

/// EIP-55 mixed-case checksum encoding.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Parse and re-encode an address in checksum form.
pub fn normalize_address(address: &str) -> Option<String> {
    parse_address(address).map(|bytes| to_checksum_address(&bytes))
}

/// Address held in the low 20 bytes of an indexed topic.
pub fn topic_address(topic: &[u8; 32]) -> String {
    let mut address = [0u8; 20];
    address.copy_from_slice(&topic[12..]);
    to_checksum_address(&address)
}

/// Decode the first return word as an address.
pub fn decode_address(output: &[u8]) -> Result<String, LedgerError> {
    let word = first_word(output)?;
    Ok(topic_address(&word))
}

/// Decode the first return word as a bool.
pub fn decode_bool(output: &[u8]) -> Result<bool, LedgerError> {
    let word = first_word(output)?;
    match word[31] {
        0 if word[..31].iter().all(|&b| b == 0) => Ok(false),
        1 if word[..31].iter().all(|&b| b == 0) => Ok(true),
        _ => Err(LedgerError::Malformed("return word is not a bool".to_string())),
    }
}

fn first_word(output: &[u8]) -> Result<[u8; 32], LedgerError> {
    output
        .get(..32)
        .and_then(|w| w.try_into().ok())
        .ok_or_else(|| LedgerError::Malformed(format!("expected 32-byte word, got {} bytes", output.len())))
}

/// `0x` followed by 64 hex digits.
pub fn is_valid_tx_hash(value: &str) -> bool {
    is_prefixed_hex(value, 64)
}

/// `0x` followed by 40 hex digits.
pub fn is_valid_address(value: &str) -> bool {
    is_prefixed_hex(value, 40)
}

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    value.len() == digits + 2
        && value.starts_with("0x")
        && value[2..].bytes().all(|b| b.is_ascii_hexdigit())
}
