//! # Multisignature Registration (type 4)
//!
//! Turns an account into an m-of-n account. The asset is
//!
//! ```text
//! multisignature: {
//!     min:       2..=16, and at most keysgroup.len() + 1
//!     keysgroup: ["+<hex key>", ...]   1..=16 unique entries
//!     lifetime:  1..=24 hours
//! }
//! ```
//!
//! The sender's own signature counts as the first of `min`, so a
//! registration with `min = 2` and one co-signer needs the sender's
//! `signature` plus one companion signature.
//!
//! ## Quorum
//!
//! A fresh registration (the account has no confirmed group yet) is ready
//! only when every co-signer has signed: `signatures.len() ==
//! keysgroup.len()`. An account that already has a group is ready once
//! `signatures.len() >= multimin - 1`.
//!
//! ## Pending guard
//!
//! Only one unconfirmed registration per address may be in flight. The
//! guard is set by `apply_unconfirmed` and cleared by `apply` /
//! `undo_unconfirmed`; `undo` re-arms it because the registration goes
//! back to the pool.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::diff;
use crate::config::{
    MULTISIG_CHANGE_EVENT, MULTISIG_FEE_UNITS, MULTISIG_MAX_KEYSGROUP, MULTISIG_MAX_LIFETIME,
    MULTISIG_MAX_MIN, MULTISIG_MIN_LIFETIME, TYPE_MULTISIGNATURE,
};
use crate::crypto::PublicKey;
use crate::storage::{Account, AccountDelta, AccountFields, Row, Scope};
use crate::transaction::amount::Amount;
use crate::transaction::codec::write_string;
use crate::transaction::error::TransactionError;
use crate::transaction::plugin::{AssetPlugin, AssetTable, PluginContext};
use crate::transaction::types::{BlockRef, Transaction};

const TABLE: AssetTable = AssetTable {
    name: "multisignature",
    prefix: "m_",
};

// ---------------------------------------------------------------------------
// MultisignatureAssetData
// ---------------------------------------------------------------------------

/// The `multisignature` asset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisignatureAssetData {
    pub min: i64,
    pub keysgroup: Vec<String>,
    pub lifetime: i64,
}

impl MultisignatureAssetData {
    /// The structural negation used by undo: operators flipped, `min` and
    /// `lifetime` negated.
    pub fn inverted(&self) -> Self {
        Self {
            min: -self.min,
            keysgroup: diff::reverse(&self.keysgroup),
            lifetime: -self.lifetime,
        }
    }

    fn confirmed_delta(&self) -> AccountDelta {
        AccountDelta {
            multisignatures: Some(self.keysgroup.clone()),
            multimin: Some(self.min),
            multilifetime: Some(self.lifetime),
            ..Default::default()
        }
    }

    fn unconfirmed_delta(&self) -> AccountDelta {
        AccountDelta {
            u_multisignatures: Some(self.keysgroup.clone()),
            u_multimin: Some(self.min),
            u_multilifetime: Some(self.lifetime),
            ..Default::default()
        }
    }

    /// Co-signer keys with the operator stripped.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keysgroup
            .iter()
            .filter_map(|entry| diff::split(entry).map(|(_, key)| key))
    }
}

// ---------------------------------------------------------------------------
// MultisignatureAsset
// ---------------------------------------------------------------------------

/// The multisignature plugin. Owns the per-address pending guard.
#[derive(Debug, Default)]
pub struct MultisignatureAsset {
    pending: Arc<DashMap<String, bool>>,
}

impl MultisignatureAsset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asset entry of `trs`, or an invalid-asset error.
    pub fn asset(trs: &Transaction) -> Result<MultisignatureAssetData, TransactionError> {
        let raw = trs
            .asset
            .get("multisignature")
            .ok_or_else(|| TransactionError::asset(&trs.id, "missing multisignature asset"))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| TransactionError::asset(&trs.id, e.to_string()))
    }

    /// Whether a registration for `address` is waiting in the pool.
    pub fn is_pending(&self, address: &str) -> bool {
        self.pending.get(address).is_some_and(|p| *p)
    }

    /// Set the guard, journaling its previous value in `scope`.
    fn set_pending(&self, address: &str, value: bool, scope: &mut Scope) {
        let previous = self.pending.insert(address.to_string(), value);
        let pending = Arc::clone(&self.pending);
        let address = address.to_string();
        scope.on_rollback(move || match previous {
            Some(prev) => {
                pending.insert(address, prev);
            }
            None => {
                pending.remove(&address);
            }
        });
    }

    fn ready_for(&self, trs: &Transaction, asset: &MultisignatureAssetData, sender: &Account) -> bool {
        if trs.signatures.is_none() {
            warn!(id = %trs.id, "multisignature is waiting for co-signer signatures");
            return false;
        }
        let have = trs.signature_count();
        if sender.multisignatures.is_empty() {
            let ready = have == asset.keysgroup.len();
            if !ready {
                warn!(
                    id = %trs.id,
                    have,
                    need = asset.keysgroup.len(),
                    "multisignature registration short of co-signer signatures"
                );
            }
            ready
        } else {
            have as i64 >= sender.multimin - 1
        }
    }
}

impl AssetPlugin for MultisignatureAsset {
    fn type_id(&self) -> u8 {
        TYPE_MULTISIGNATURE
    }

    fn name(&self) -> &'static str {
        "multisignature"
    }

    /// Params: `{ "min": n, "keysgroup": ["+<hex>", ...], "lifetime": h }`.
    fn create(&self, params: &Value, mut trs: Transaction) -> Result<Transaction, TransactionError> {
        let asset: MultisignatureAssetData = serde_json::from_value(params.clone())
            .map_err(|e| TransactionError::asset(&trs.id, e.to_string()))?;
        trs.recipient_id = None;
        trs.amount = "0".to_string();
        trs.asset
            .insert("multisignature".to_string(), serde_json::to_value(asset)?);
        Ok(trs)
    }

    fn calculate_fee(
        &self,
        trs: &Transaction,
        _sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<Amount, TransactionError> {
        let asset = Self::asset(trs)?;
        let units = (asset.keysgroup.len() as u64 + 1) * MULTISIG_FEE_UNITS;
        Ok(Amount::from_units(units, ctx.config.fixed_point))
    }

    fn verify(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<(), TransactionError> {
        let asset = Self::asset(trs)?;

        if asset.keysgroup.is_empty() {
            return Err(TransactionError::asset(
                &trs.id,
                "multisignature group must contain at least one member",
            ));
        }
        if asset.keysgroup.len() > MULTISIG_MAX_KEYSGROUP {
            return Err(TransactionError::asset(&trs.id, "multisignature group too large"));
        }
        if asset.min <= 1 || asset.min > MULTISIG_MAX_MIN {
            return Err(TransactionError::asset(&trs.id, "invalid multisignature min"));
        }
        if asset.min > asset.keysgroup.len() as i64 + 1 {
            return Err(TransactionError::asset(
                &trs.id,
                "multisignature min exceeds group size",
            ));
        }
        if asset.lifetime < MULTISIG_MIN_LIFETIME || asset.lifetime > MULTISIG_MAX_LIFETIME {
            return Err(TransactionError::asset(&trs.id, "invalid multisignature lifetime"));
        }

        if self.ready_for(trs, &asset, sender) {
            let signatures = trs.signatures.as_deref().unwrap_or_default();
            for entry in &asset.keysgroup {
                let key = match diff::split(entry) {
                    Some(('+' | '-', key)) => key,
                    _ => return Err(TransactionError::InvalidMultisignature { id: trs.id.clone() }),
                };
                let mut signed = false;
                for sig in signatures {
                    if ctx.codec.verify_signature(trs, key, Some(sig))? {
                        signed = true;
                        break;
                    }
                }
                if !signed {
                    return Err(TransactionError::InvalidMultisignature { id: trs.id.clone() });
                }
            }
        }

        if asset
            .keysgroup
            .iter()
            .any(|entry| entry.strip_prefix('+') == Some(trs.sender_public_key.as_str()))
        {
            return Err(TransactionError::asset(
                &trs.id,
                "unable to sign transaction using own public key",
            ));
        }

        for entry in &asset.keysgroup {
            match diff::split(entry) {
                Some(('+', key)) => {
                    PublicKey::from_hex(key)?;
                }
                _ => return Err(TransactionError::asset(&trs.id, "invalid math operator")),
            }
        }

        let mut seen = std::collections::HashSet::with_capacity(asset.keysgroup.len());
        if !asset.keysgroup.iter().all(|entry| seen.insert(entry.as_str())) {
            return Err(TransactionError::asset(
                &trs.id,
                "multisignature group contains non-unique public keys",
            ));
        }

        Ok(())
    }

    /// `min` byte, `lifetime` byte, length-prefixed concatenated keysgroup.
    fn get_bytes(&self, trs: &Transaction) -> Result<Vec<u8>, TransactionError> {
        let asset = Self::asset(trs)?;
        let min = u8::try_from(asset.min)
            .map_err(|_| TransactionError::asset(&trs.id, "invalid multisignature min"))?;
        let lifetime = u8::try_from(asset.lifetime)
            .map_err(|_| TransactionError::asset(&trs.id, "invalid multisignature lifetime"))?;

        let keysgroup = asset.keysgroup.concat();
        let mut buf = Vec::with_capacity(2 + 4 + keysgroup.len());
        buf.push(min);
        buf.push(lifetime);
        write_string(&mut buf, &keysgroup);
        Ok(buf)
    }

    fn apply(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let asset = Self::asset(trs)?;
        self.set_pending(&sender.address, false, scope);

        let delta = asset
            .confirmed_delta()
            .in_block(block.id.clone(), ctx.rounds.calc(block.height));
        ctx.ledger.merge(&sender.address, &delta, scope)?;

        // Placeholder accounts so later lookups of a co-signer never miss.
        for key in asset.keys() {
            let address = ctx.ledger.generate_address_by_public_key(key)?;
            ctx.ledger.set_account(
                AccountFields {
                    address: Some(address),
                    public_key: Some(key.to_string()),
                    block_id: Some(block.id.clone()),
                },
                scope,
            )?;
        }

        debug!(id = %trs.id, address = %sender.address, min = asset.min, "multisignature group applied");
        Ok(())
    }

    fn undo(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let inverse = Self::asset(trs)?.inverted();
        self.set_pending(&sender.address, true, scope);

        let delta = inverse
            .confirmed_delta()
            .in_block(block.id.clone(), ctx.rounds.calc(block.height));
        ctx.ledger.merge(&sender.address, &delta, scope)?;
        Ok(())
    }

    fn apply_unconfirmed(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let asset = Self::asset(trs)?;

        // Check-and-set under the map's shard lock so two submissions for
        // the same address cannot both pass.
        let previous = {
            let mut guard = self.pending.entry(sender.address.clone()).or_insert(false);
            if *guard {
                return Err(TransactionError::PendingConfirmation);
            }
            if sender.has_multisignatures() {
                return Err(TransactionError::AlreadyEnabled("multisignatures"));
            }
            let previous = *guard;
            *guard = true;
            previous
        };
        let pending = Arc::clone(&self.pending);
        let address = sender.address.clone();
        scope.on_rollback(move || {
            pending.insert(address, previous);
        });

        ctx.ledger
            .merge(&sender.address, &asset.unconfirmed_delta(), scope)?;
        Ok(())
    }

    fn undo_unconfirmed(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let inverse = Self::asset(trs)?.inverted();
        self.set_pending(&sender.address, false, scope);
        ctx.ledger
            .merge(&sender.address, &inverse.unconfirmed_delta(), scope)?;
        Ok(())
    }

    fn object_normalize(&self, trs: Transaction) -> Result<Transaction, TransactionError> {
        let raw = trs.asset.get("multisignature").ok_or_else(|| {
            TransactionError::Normalize("invalid multisignature parameters: missing asset".into())
        })?;
        let invalid = |what: &str| {
            TransactionError::Normalize(format!("invalid multisignature parameters: {what}"))
        };

        let min = raw.get("min").and_then(Value::as_i64).ok_or_else(|| invalid("min"))?;
        if !(1..=MULTISIG_MAX_MIN).contains(&min) {
            return Err(invalid("min out of range"));
        }
        let keysgroup = raw
            .get("keysgroup")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("keysgroup"))?;
        if keysgroup.is_empty() || keysgroup.len() > MULTISIG_MAX_KEYSGROUP {
            return Err(invalid("keysgroup size"));
        }
        if !keysgroup.iter().all(Value::is_string) {
            return Err(invalid("keysgroup entries must be strings"));
        }
        let lifetime = raw
            .get("lifetime")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("lifetime"))?;
        if !(MULTISIG_MIN_LIFETIME..=MULTISIG_MAX_LIFETIME).contains(&lifetime) {
            return Err(invalid("lifetime out of range"));
        }
        Ok(trs)
    }

    fn asset_table(&self) -> Option<AssetTable> {
        Some(TABLE)
    }

    fn db_read(&self, raw: &Row) -> Result<Option<Value>, TransactionError> {
        let Some(keysgroup) = raw
            .get("m_keysgroup")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
        else {
            return Ok(None);
        };
        let keysgroup: Vec<&str> = keysgroup.split(',').collect();
        Ok(Some(json!({
            "min": raw.get("m_min").cloned().unwrap_or(Value::Null),
            "keysgroup": keysgroup,
            "lifetime": raw.get("m_lifetime").cloned().unwrap_or(Value::Null),
        })))
    }

    fn db_save(
        &self,
        trs: &Transaction,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let asset = Self::asset(trs)?;
        let mut row = Row::new();
        row.insert("min".into(), json!(asset.min));
        row.insert("lifetime".into(), json!(asset.lifetime));
        row.insert("keysgroup".into(), json!(asset.keysgroup.join(",")));
        row.insert("transaction_id".into(), json!(trs.id));
        ctx.store.insert(TABLE.name, row, scope)?;

        if let Err(e) = ctx
            .notifier
            .emit(MULTISIG_CHANGE_EVENT, json!({ "transaction_id": trs.id }))
        {
            warn!(id = %trs.id, error = %e, "failed to emit {}", MULTISIG_CHANGE_EVENT);
        }
        Ok(())
    }

    fn companion_keys(&self, trs: &Transaction) -> Result<Vec<String>, TransactionError> {
        Ok(Self::asset(trs)?.keys().map(str::to_string).collect())
    }

    fn ready(&self, trs: &Transaction, sender: &Account) -> bool {
        match Self::asset(trs) {
            Ok(asset) => self.ready_for(trs, &asset, sender),
            Err(_) => false,
        }
    }
}
