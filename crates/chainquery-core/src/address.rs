//! Address derivation from account public keys.
//!
//! `address = network || ripemd160(sha3_256(pk)) || checksum`, where the
//! checksum is the first 3 bytes of `sha3_256(network || ripemd160(..))`.
//! Addresses and keys travel as uppercase hex.

use ripemd::{Digest, Ripemd160};
use tiny_keccak::{Hasher, Sha3};

use crate::error::QueryError;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const ADDRESS_SIZE: usize = 24;
const CHECKSUM_SIZE: usize = 3;

fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3::v256();
    let mut out = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

/// Derive the network address for a hex-encoded public key.
pub fn public_key_to_address(public_key: &str, network_id: u8) -> Result<String, QueryError> {
    let key = hex::decode(public_key)
        .map_err(|e| QueryError::InvalidQuery(format!("public key '{public_key}': {e}")))?;
    if key.len() != PUBLIC_KEY_SIZE {
        return Err(QueryError::InvalidQuery(format!(
            "public key must be {PUBLIC_KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }

    let key_hash = Ripemd160::digest(sha3_256(&key));

    let mut address = Vec::with_capacity(ADDRESS_SIZE);
    address.push(network_id);
    address.extend_from_slice(&key_hash);
    let checksum = sha3_256(&address);
    address.extend_from_slice(&checksum[..CHECKSUM_SIZE]);

    Ok(hex::encode_upper(address))
}

/// Canonical (uppercase) form of a hex identifier supplied by a caller.
pub fn normalize_hex(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}
