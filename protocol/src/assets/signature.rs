//! Type 1: second-signature registration.
//!
//! Asset: `signature: { public_key }`. Once confirmed, every later
//! transaction from the account must carry a `sign_signature` made with
//! the registered key.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::TYPE_SECOND_SIGNATURE;
use crate::crypto::PublicKey;
use crate::storage::{Account, AccountDelta, Row, Scope};
use crate::transaction::amount::Amount;
use crate::transaction::error::TransactionError;
use crate::transaction::plugin::{AssetPlugin, AssetTable, PluginContext};
use crate::transaction::types::{BlockRef, Transaction};

const TABLE: AssetTable = AssetTable {
    name: "signature",
    prefix: "s_",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureAssetData {
    pub public_key: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SecondSignatureAsset;

impl SecondSignatureAsset {
    fn asset(trs: &Transaction) -> Result<SignatureAssetData, TransactionError> {
        let raw = trs
            .asset
            .get("signature")
            .ok_or_else(|| TransactionError::asset(&trs.id, "missing signature asset"))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| TransactionError::asset(&trs.id, e.to_string()))
    }
}

impl AssetPlugin for SecondSignatureAsset {
    fn type_id(&self) -> u8 {
        TYPE_SECOND_SIGNATURE
    }

    fn name(&self) -> &'static str {
        "signature"
    }

    /// Params: `{ "public_key": "<hex>" }`.
    fn create(&self, params: &Value, mut trs: Transaction) -> Result<Transaction, TransactionError> {
        let public_key = params
            .get("public_key")
            .and_then(Value::as_str)
            .ok_or_else(|| TransactionError::asset(&trs.id, "missing public_key"))?;
        trs.recipient_id = None;
        trs.amount = "0".to_string();
        trs.asset
            .insert("signature".to_string(), json!({ "public_key": public_key }));
        Ok(trs)
    }

    fn calculate_fee(
        &self,
        _trs: &Transaction,
        _sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<Amount, TransactionError> {
        Ok(Amount::from(ctx.config.second_signature_fee))
    }

    fn verify(
        &self,
        trs: &Transaction,
        sender: &Account,
        _ctx: &PluginContext<'_>,
    ) -> Result<(), TransactionError> {
        let asset = Self::asset(trs)?;
        if sender.second_signature {
            return Err(TransactionError::asset(&trs.id, "second signature already enabled"));
        }
        if trs.recipient_id.as_deref().is_some_and(|r| !r.is_empty()) {
            return Err(TransactionError::asset(&trs.id, "invalid recipient"));
        }
        if !trs.amount()?.is_zero() {
            return Err(TransactionError::InvalidAmount { id: trs.id.clone() });
        }
        PublicKey::from_hex(&asset.public_key)?;
        Ok(())
    }

    fn get_bytes(&self, trs: &Transaction) -> Result<Vec<u8>, TransactionError> {
        let asset = Self::asset(trs)?;
        Ok(PublicKey::from_hex(&asset.public_key)?.as_bytes().to_vec())
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
        let delta = AccountDelta {
            second_signature: Some(true),
            u_second_signature: Some(false),
            second_public_key: Some(Some(asset.public_key)),
            ..Default::default()
        }
        .in_block(block.id.clone(), ctx.rounds.calc(block.height));
        ctx.ledger.merge(&sender.address, &delta, scope)?;
        Ok(())
    }

    fn undo(
        &self,
        _trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let delta = AccountDelta {
            second_signature: Some(false),
            u_second_signature: Some(true),
            second_public_key: Some(None),
            ..Default::default()
        }
        .in_block(block.id.clone(), ctx.rounds.calc(block.height));
        ctx.ledger.merge(&sender.address, &delta, scope)?;
        Ok(())
    }

    fn apply_unconfirmed(
        &self,
        _trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        if sender.second_signature {
            return Err(TransactionError::AlreadyEnabled("a second signature"));
        }
        if sender.u_second_signature {
            return Err(TransactionError::PendingConfirmation);
        }
        let delta = AccountDelta {
            u_second_signature: Some(true),
            ..Default::default()
        };
        ctx.ledger.merge(&sender.address, &delta, scope)?;
        Ok(())
    }

    fn undo_unconfirmed(
        &self,
        _trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let delta = AccountDelta {
            u_second_signature: Some(false),
            ..Default::default()
        };
        ctx.ledger.merge(&sender.address, &delta, scope)?;
        Ok(())
    }

    fn object_normalize(&self, trs: Transaction) -> Result<Transaction, TransactionError> {
        let asset = Self::asset(&trs)?;
        let well_formed = asset.public_key.len() == 64
            && asset.public_key.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(TransactionError::Normalize(format!(
                "invalid signature public key: {}",
                asset.public_key
            )));
        }
        Ok(trs)
    }

    fn asset_table(&self) -> Option<AssetTable> {
        Some(TABLE)
    }

    fn db_read(&self, raw: &Row) -> Result<Option<Value>, TransactionError> {
        match raw.get("s_public_key").and_then(Value::as_str) {
            Some(pk) if !pk.is_empty() => Ok(Some(json!({ "public_key": pk }))),
            _ => Ok(None),
        }
    }

    fn db_save(
        &self,
        trs: &Transaction,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let asset = Self::asset(trs)?;
        let mut row = Row::new();
        row.insert("transaction_id".into(), json!(trs.id));
        row.insert("public_key".into(), json!(asset.public_key));
        ctx.store.insert(TABLE.name, row, scope)?;
        Ok(())
    }
}
