//! # Canonical Codec
//!
//! The one byte layout that is both the hash preimage for a transaction's
//! `id` and the message its signatures commit to:
//!
//! ```text
//! type            u8
//! timestamp       u32 LE
//! nethash         str
//! sender key      32 raw bytes
//! requester key   32 raw bytes          (only if present)
//! recipient       str | 8 zero bytes
//! amount          str                   (decimal digits)
//! message         str                   (only if present)
//! args[i]         str ...               (only if present)
//! asset           plugin bytes
//! signature       64 raw bytes          (unless skipped or absent)
//! sign_signature  64 raw bytes          (unless skipped or absent)
//!
//! str := u32 LE byte length || utf-8 bytes
//! ```
//!
//! Companion `signatures` are never part of the encoding; co-signers sign
//! the same preimage as the sender.
//!
//! Signing always skips both signatures. Second-signing skips only the
//! second. Signatures are Ed25519 over the SHA-256 digest of the preimage.

use std::sync::Arc;

use super::error::TransactionError;
use super::plugin::AssetRegistry;
use super::types::Transaction;
use crate::config::PUBLIC_KEY_LENGTH;
use crate::crypto::{sha256, Keypair, PublicKey, Signature};

/// Encoded stand-in for an absent recipient.
const EMPTY_RECIPIENT: [u8; 8] = [0u8; 8];

/// Append a length-prefixed UTF-8 string.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Canonical encoder plus the signing and hashing built on it.
#[derive(Debug, Clone)]
pub struct TransactionCodec {
    registry: Arc<AssetRegistry>,
}

impl TransactionCodec {
    pub fn new(registry: Arc<AssetRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Canonical bytes of `trs`.
    pub fn get_bytes(
        &self,
        trs: &Transaction,
        skip_signature: bool,
        skip_second_signature: bool,
    ) -> Result<Vec<u8>, TransactionError> {
        let plugin = self.registry.get(trs.tx_type)?;
        let asset_bytes = plugin.get_bytes(trs)?;

        let mut buf = Vec::with_capacity(
            1 + 4 + 4 + trs.nethash.len() + 2 * PUBLIC_KEY_LENGTH + 64 + asset_bytes.len() + 128,
        );

        buf.push(trs.tx_type);
        buf.extend_from_slice(&trs.timestamp.to_le_bytes());
        write_string(&mut buf, &trs.nethash);

        let sender = PublicKey::from_hex(&trs.sender_public_key)?;
        buf.extend_from_slice(sender.as_bytes());

        if let Some(requester) = &trs.requester_public_key {
            let requester = PublicKey::from_hex(requester)?;
            buf.extend_from_slice(requester.as_bytes());
        }

        match trs.recipient_id.as_deref() {
            Some(recipient) if !recipient.is_empty() => write_string(&mut buf, recipient),
            _ => buf.extend_from_slice(&EMPTY_RECIPIENT),
        }

        write_string(&mut buf, &trs.amount);

        if let Some(message) = trs.message.as_deref().filter(|m| !m.is_empty()) {
            write_string(&mut buf, message);
        }

        for arg in trs.args.iter().flatten() {
            write_string(&mut buf, arg);
        }

        buf.extend_from_slice(&asset_bytes);

        if !skip_signature {
            if let Some(sig) = &trs.signature {
                buf.extend_from_slice(decode_signature(sig)?.as_bytes());
            }
        }

        if !skip_second_signature {
            if let Some(sig) = &trs.sign_signature {
                buf.extend_from_slice(decode_signature(sig)?.as_bytes());
            }
        }

        Ok(buf)
    }

    /// SHA-256 of the full encoding.
    pub fn get_hash(&self, trs: &Transaction) -> Result<[u8; 32], TransactionError> {
        Ok(sha256(&self.get_bytes(trs, false, false)?))
    }

    /// Hex of [`get_hash`](Self::get_hash).
    pub fn get_id(&self, trs: &Transaction) -> Result<String, TransactionError> {
        Ok(hex::encode(self.get_hash(trs)?))
    }

    /// Primary signature, hex.
    pub fn sign(&self, keypair: &Keypair, trs: &Transaction) -> Result<String, TransactionError> {
        let digest = sha256(&self.get_bytes(trs, true, true)?);
        Ok(keypair.sign(&digest).to_hex())
    }

    /// Second-factor signature, hex. Commits to the primary signature.
    pub fn second_sign(
        &self,
        keypair: &Keypair,
        trs: &Transaction,
    ) -> Result<String, TransactionError> {
        let digest = sha256(&self.get_bytes(trs, false, true)?);
        Ok(keypair.sign(&digest).to_hex())
    }

    /// Companion co-signer signature, hex. Same preimage as [`sign`](Self::sign).
    pub fn multisign(&self, keypair: &Keypair, trs: &Transaction) -> Result<String, TransactionError> {
        self.sign(keypair, trs)
    }

    /// Check a primary or companion signature. Malformed keys and
    /// signatures verify as `false`.
    pub fn verify_signature(
        &self,
        trs: &Transaction,
        public_key: &str,
        signature: Option<&str>,
    ) -> Result<bool, TransactionError> {
        let Some(signature) = signature else {
            return Ok(false);
        };
        let bytes = self.get_bytes(trs, true, true)?;
        Ok(verify_bytes(&bytes, public_key, signature))
    }

    /// Check a second-factor signature.
    pub fn verify_second_signature(
        &self,
        trs: &Transaction,
        public_key: &str,
        signature: Option<&str>,
    ) -> Result<bool, TransactionError> {
        let Some(signature) = signature else {
            return Ok(false);
        };
        let bytes = self.get_bytes(trs, false, true)?;
        Ok(verify_bytes(&bytes, public_key, signature))
    }
}

fn decode_signature(hex_sig: &str) -> Result<Signature, TransactionError> {
    Signature::from_hex(hex_sig).map_err(|_| TransactionError::InvalidSignature("malformed signature"))
}

fn verify_bytes(bytes: &[u8], public_key: &str, signature: &str) -> bool {
    let (Ok(pk), Ok(sig)) = (PublicKey::from_hex(public_key), Signature::from_hex(signature)) else {
        return false;
    };
    pk.verify(&sha256(bytes), &sig)
}
