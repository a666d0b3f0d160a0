//! Core transaction data model.
//!
//! A [`Transaction`] is plain data: the engine and the asset plugins give it
//! meaning. Field names follow the JSON wire format (`sender_public_key`,
//! `sign_signature`, ...) so a transaction deserializes straight from an
//! API payload or a peer message.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::amount::{Amount, AmountError};

/// Asset payloads keyed by the owning plugin's field name
/// (e.g. `"multisignature"`). Each plugin owns only its own entry.
pub type AssetMap = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed, typed ledger transaction.
///
/// `id` is derived: it is the hex SHA-256 of the full canonical encoding
/// (signatures included, companion `signatures` excluded) and is never
/// trusted when supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex SHA-256 of the canonical bytes. Empty until computed.
    #[serde(default)]
    pub id: String,

    /// Integer tag selecting the asset plugin.
    #[serde(rename = "type")]
    pub tx_type: u8,

    /// Slot-quantized logical time (seconds since the network epoch).
    pub timestamp: u32,

    /// Network identifier; must match the node's configured value.
    #[serde(default)]
    pub nethash: String,

    /// Hex Ed25519 key of the account paying for the transaction.
    pub sender_public_key: String,

    /// Hex key of a multisignature co-signer submitting on the sender's
    /// behalf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_public_key: Option<String>,

    /// Address derived from `sender_public_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    /// Decimal integer string in base units.
    pub amount: String,

    /// Decimal integer string in base units; must equal the plugin fee.
    #[serde(default)]
    pub fee: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    #[serde(default)]
    pub asset: AssetMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Second-factor signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_signature: Option<String>,

    /// Companion co-signer signatures, in collection order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
}

impl Transaction {
    /// Bare transaction of the given type; everything else is filled by the
    /// engine and the asset plugin.
    pub fn new(tx_type: u8, sender_public_key: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            tx_type,
            timestamp: 0,
            nethash: String::new(),
            sender_public_key: sender_public_key.into(),
            requester_public_key: None,
            sender_id: None,
            recipient_id: None,
            amount: "0".to_string(),
            fee: "0".to_string(),
            message: None,
            args: None,
            asset: AssetMap::new(),
            signature: None,
            sign_signature: None,
            signatures: None,
            block_id: None,
            block_height: None,
            confirmations: None,
        }
    }

    /// Strictly parsed `amount`.
    pub fn amount(&self) -> Result<Amount, AmountError> {
        Amount::parse(&self.amount)
    }

    /// Strictly parsed `fee`.
    pub fn fee(&self) -> Result<Amount, AmountError> {
        Amount::parse(&self.fee)
    }

    /// `amount + fee`, the total debited from the sender.
    pub fn total_cost(&self) -> Result<Amount, AmountError> {
        Ok(&self.amount()? + &self.fee()?)
    }

    /// Number of companion signatures collected so far.
    pub fn signature_count(&self) -> usize {
        self.signatures.as_ref().map_or(0, Vec::len)
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

// ---------------------------------------------------------------------------
// BlockRef
// ---------------------------------------------------------------------------

/// The block a confirmed apply or undo belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub id: String,
    pub height: u64,
}

impl BlockRef {
    pub fn new(id: impl Into<String>, height: u64) -> Self {
        Self {
            id: id.into(),
            height,
        }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.height)
    }
}
