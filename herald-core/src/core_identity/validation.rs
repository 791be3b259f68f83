//! Validation module
//!
//! Stateless format checks for identities arriving from the network.

/// Length of a hex-encoded public key
pub const PUBKEY_HEX_LEN: usize = 64;

/// Whether `s` is a 64-character lowercase hex string
pub fn is_valid_pubkey(s: &str) -> bool {
    s.len() == PUBKEY_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
