//! Minimal Solidity ABI encoding for calls whose arguments are all `string`.

use sha3::{Digest, Keccak256};

/// First four bytes of `keccak256(signature)`, e.g. `addFile(string,string)`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Canonical signature, e.g. `addFile(string,string)`.
pub fn function_signature(name: &str, input_types: &[&str]) -> String {
    format!("{}({})", name, input_types.join(","))
}

/// Encodes a call with dynamic `string` arguments as `0x`-prefixed calldata.
///
/// Layout: selector, one 32-byte offset per argument, then for each argument
/// its 32-byte length followed by the UTF-8 bytes right-padded to 32 bytes.
pub fn encode_string_call(selector: [u8; 4], args: &[&str]) -> String {
    let mut head = Vec::with_capacity(32 * args.len());
    let mut tail = Vec::new();
    let head_len = 32 * args.len();

    for arg in args {
        head.extend_from_slice(&encode_u256((head_len + tail.len()) as u64));

        let bytes = arg.as_bytes();
        tail.extend_from_slice(&encode_u256(bytes.len() as u64));
        tail.extend_from_slice(bytes);
        let padding = (32 - bytes.len() % 32) % 32;
        tail.extend(std::iter::repeat_n(0u8, padding));
    }

    let mut calldata = Vec::with_capacity(4 + head.len() + tail.len());
    calldata.extend_from_slice(&selector);
    calldata.extend_from_slice(&head);
    calldata.extend_from_slice(&tail);
    format!("0x{}", hex::encode(calldata))
}

fn encode_u256(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `0x`-prefixed hex quantity as used by JSON-RPC (`300000` -> `0x493e0`).
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

pub fn parse_quantity(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}
