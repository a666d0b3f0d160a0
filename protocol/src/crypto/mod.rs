//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) for transaction, second and companion
//!   signatures.
//! - **SHA-256** (`sha2`) for transaction hashes, ids and signing digests.
//! - **base58check** (`bs58`) for account addresses.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{address_from_hex, address_from_public_key, is_valid_address};
pub use hash::{double_sha256, sha256, sha256_hex};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
