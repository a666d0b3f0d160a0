//! Account address derivation.
//!
//! ```text
//! public_key (32 bytes)
//!     -> SHA-256 -> first 20 bytes          (payload)
//!     -> payload || double_sha256(payload)[..4]
//!     -> prefix + base58(...)
//! ```
//!
//! The prefix comes from [`crate::config::EngineConfig::address_prefix`] so
//! that different networks produce visibly different addresses.

use super::hash::{double_sha256, sha256};
use super::keys::{KeyError, PublicKey};

/// Number of digest bytes kept in the address payload.
const ADDRESS_PAYLOAD_LENGTH: usize = 20;

/// Number of checksum bytes appended before base58 encoding.
const CHECKSUM_LENGTH: usize = 4;

/// Derive an address from raw public key bytes.
pub fn address_from_public_key(prefix: &str, public_key: &PublicKey) -> String {
    let digest = sha256(public_key.as_bytes());
    let payload = &digest[..ADDRESS_PAYLOAD_LENGTH];
    let checksum = double_sha256(payload);

    let mut raw = Vec::with_capacity(ADDRESS_PAYLOAD_LENGTH + CHECKSUM_LENGTH);
    raw.extend_from_slice(payload);
    raw.extend_from_slice(&checksum[..CHECKSUM_LENGTH]);

    format!("{}{}", prefix, bs58::encode(raw).into_string())
}

/// Derive an address from a hex-encoded public key.
pub fn address_from_hex(prefix: &str, public_key_hex: &str) -> Result<String, KeyError> {
    let public_key = PublicKey::from_hex(public_key_hex)?;
    Ok(address_from_public_key(prefix, &public_key))
}

/// Returns `true` if `address` carries `prefix` and a valid checksum.
pub fn is_valid_address(prefix: &str, address: &str) -> bool {
    let Some(encoded) = address.strip_prefix(prefix) else {
        return false;
    };
    let Ok(raw) = bs58::decode(encoded).into_vec() else {
        return false;
    };
    if raw.len() != ADDRESS_PAYLOAD_LENGTH + CHECKSUM_LENGTH {
        return false;
    }
    let (payload, checksum) = raw.split_at(ADDRESS_PAYLOAD_LENGTH);
    double_sha256(payload)[..CHECKSUM_LENGTH] == *checksum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn derived_address_is_stable_and_valid() {
        let kp = Keypair::from_secret("alice");
        let a = address_from_public_key("M", &kp.public_key());
        let b = address_from_hex("M", &kp.public_key_hex()).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with('M'));
        assert!(is_valid_address("M", &a));
    }

    #[test]
    fn different_keys_different_addresses() {
        let a = address_from_public_key("M", &Keypair::from_secret("a").public_key());
        let b = address_from_public_key("M", &Keypair::from_secret("b").public_key());
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_address_fails_checksum() {
        let addr = address_from_public_key("M", &Keypair::from_secret("alice").public_key());
        let mut tampered: Vec<char> = addr.chars().collect();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == '2' { '3' } else { '2' };
        let tampered: String = tampered.into_iter().collect();
        assert!(!is_valid_address("M", &tampered));
        assert!(!is_valid_address("X", &addr));
    }

    #[test]
    fn bad_hex_rejected() {
        assert!(address_from_hex("M", "abcd").is_err());
    }
}
