//! # Hashing Utilities
//!
//! SHA-256 is the only digest the transaction core needs:
//!
//! - the transaction hash (and therefore its `id`) is `SHA-256(encode(trs))`,
//! - signatures are produced over `SHA-256(encode(trs, skip, skip))`,
//! - addresses are derived from `SHA-256(public_key)`.
//!
//! The helpers return fixed-size arrays so callers can feed them straight
//! into signing or hex encoding without an intermediate allocation.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data`.
///
/// # Example
///
/// ```
/// use meridian_protocol::crypto::sha256;
///
/// let hash = sha256(b"meridian");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `SHA-256(SHA-256(data))`, used for address checksums.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn double_sha256_differs_from_single() {
        let data = b"meridian";
        assert_ne!(sha256(data), double_sha256(data));
        assert_eq!(double_sha256(data), sha256(&sha256(data)));
    }
}
