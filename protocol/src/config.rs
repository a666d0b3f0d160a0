//! # Protocol Configuration & Constants
//!
//! Every magic number in the transaction core lives here, together with
//! [`EngineConfig`], the per-network settings a node loads at startup.
//!
//! Changing a constant after launch changes which transactions are valid,
//! so treat this file as consensus-critical.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Wire protocol version reported by nodes.
pub const PROTOCOL_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Transaction ids are hex SHA-256 digests.
pub const TRANSACTION_ID_HEX_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Asset Type Tags
// ---------------------------------------------------------------------------

/// Plain value transfer.
pub const TYPE_TRANSFER: u8 = 0;

/// Second-signature (second factor) registration.
pub const TYPE_SECOND_SIGNATURE: u8 = 1;

/// Multisignature group registration.
pub const TYPE_MULTISIGNATURE: u8 = 4;

// ---------------------------------------------------------------------------
// Multisignature Bounds
// ---------------------------------------------------------------------------

/// Maximum number of co-signers in a keysgroup.
pub const MULTISIG_MAX_KEYSGROUP: usize = 16;

/// Upper bound for `min` (inclusive). The lower bound is exclusive at 1.
pub const MULTISIG_MAX_MIN: i64 = 16;

/// Lifetime bounds in hours, inclusive.
pub const MULTISIG_MIN_LIFETIME: i64 = 1;
pub const MULTISIG_MAX_LIFETIME: i64 = 24;

/// Fee units charged per keysgroup member (plus one for the sender).
pub const MULTISIG_FEE_UNITS: u64 = 5;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Table holding base transaction rows.
pub const TRANSACTIONS_TABLE: &str = "tr";

/// Event emitted after a multisignature registration is persisted.
pub const MULTISIG_CHANGE_EVENT: &str = "multisignatures/change";

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Network settings consumed by the transaction engine and its plugins.
///
/// Defaults describe a local development network. Nodes normally load this
/// from a JSON file; any field left out keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Network identifier every transaction must carry verbatim.
    pub nethash: String,

    /// Number of base units in one whole token (10^8).
    pub fixed_point: u64,

    /// Largest whole-token amount a single transaction may move. The base
    /// unit limit is `max_amount * fixed_point`.
    pub max_amount: u64,

    /// Pool size above which `receive_transactions` refuses new batches.
    pub max_txs_per_block: usize,

    /// Enables the lock-height restriction for lock-aware asset types.
    pub enable_more_lock_types: bool,

    /// Id of the genesis block. Genesis transactions are exempt from
    /// balance and sender-resolution checks.
    pub genesis_block_id: String,

    /// Leading characters of every derived address.
    pub address_prefix: String,

    /// Slot length in seconds.
    pub slot_interval_secs: u64,

    /// Wall-clock instant of logical time zero.
    pub epoch_time: DateTime<Utc>,

    /// Number of delegates per round.
    pub delegates: u64,

    /// Fixed fee for transfers, in base units.
    pub transfer_fee: u64,

    /// Fixed fee for second-signature registration, in base units.
    pub second_signature_fee: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nethash: "0ab796cd".to_string(),
            fixed_point: 100_000_000,
            max_amount: 100_000_000,
            max_txs_per_block: 500,
            enable_more_lock_types: false,
            genesis_block_id: String::new(),
            address_prefix: "M".to_string(),
            slot_interval_secs: 10,
            epoch_time: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            delegates: 101,
            transfer_fee: 10_000_000,
            second_signature_fee: 500_000_000,
        }
    }
}

impl EngineConfig {
    /// Returns `true` if `block_id` names the genesis block.
    pub fn is_genesis(&self, block_id: Option<&str>) -> bool {
        !self.genesis_block_id.is_empty() && block_id == Some(self.genesis_block_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_type_tags_are_distinct() {
        assert_ne!(TYPE_TRANSFER, TYPE_SECOND_SIGNATURE);
        assert_ne!(TYPE_TRANSFER, TYPE_MULTISIGNATURE);
        assert_ne!(TYPE_SECOND_SIGNATURE, TYPE_MULTISIGNATURE);
    }

    #[test]
    fn multisig_bounds_sanity() {
        assert!(MULTISIG_MIN_LIFETIME < MULTISIG_MAX_LIFETIME);
        assert_eq!(MULTISIG_MAX_MIN as usize, MULTISIG_MAX_KEYSGROUP);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "nethash": "deadbeef", "max_txs_per_block": 3 }"#).unwrap();
        assert_eq!(cfg.nethash, "deadbeef");
        assert_eq!(cfg.max_txs_per_block, 3);
        assert_eq!(cfg.fixed_point, EngineConfig::default().fixed_point);
    }

    #[test]
    fn genesis_detection_requires_configured_id() {
        let mut cfg = EngineConfig::default();
        assert!(!cfg.is_genesis(Some("")));
        cfg.genesis_block_id = "g1".to_string();
        assert!(cfg.is_genesis(Some("g1")));
        assert!(!cfg.is_genesis(Some("b2")));
        assert!(!cfg.is_genesis(None));
    }
}
