//! Type 0: plain value transfer.
//!
//! Carries no asset entry. The engine debits `amount + fee` from the
//! sender; this plugin credits `amount` to the recipient once the
//! transaction is confirmed. The recipient's unconfirmed balance is not
//! touched while the transfer sits in the pool, so pooled funds can never
//! be re-spent before they exist.

use serde_json::Value;

use crate::config::TYPE_TRANSFER;
use crate::crypto::is_valid_address;
use crate::storage::{Account, AccountDelta, Scope};
use crate::transaction::amount::Amount;
use crate::transaction::error::TransactionError;
use crate::transaction::plugin::{AssetPlugin, PluginContext};
use crate::transaction::types::{BlockRef, Transaction};

#[derive(Debug, Default, Clone, Copy)]
pub struct TransferAsset;

impl TransferAsset {
    fn recipient<'t>(trs: &'t Transaction) -> Result<&'t str, TransactionError> {
        trs.recipient_id
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| TransactionError::asset(&trs.id, "invalid recipient"))
    }
}

impl AssetPlugin for TransferAsset {
    fn type_id(&self) -> u8 {
        TYPE_TRANSFER
    }

    fn name(&self) -> &'static str {
        "transfer"
    }

    /// Params: `{ "recipient_id": "...", "amount": "..." }`.
    fn create(&self, params: &Value, mut trs: Transaction) -> Result<Transaction, TransactionError> {
        let recipient = params
            .get("recipient_id")
            .and_then(Value::as_str)
            .ok_or_else(|| TransactionError::asset(&trs.id, "missing recipient_id"))?;
        let amount = match params.get("amount") {
            Some(Value::String(s)) => Amount::parse(s)?,
            Some(Value::Number(n)) => Amount::parse(&n.to_string())?,
            _ => return Err(TransactionError::asset(&trs.id, "missing amount")),
        };
        trs.recipient_id = Some(recipient.to_string());
        trs.amount = amount.to_string();
        Ok(trs)
    }

    fn calculate_fee(
        &self,
        _trs: &Transaction,
        _sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<Amount, TransactionError> {
        Ok(Amount::from(ctx.config.transfer_fee))
    }

    fn verify(
        &self,
        trs: &Transaction,
        _sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<(), TransactionError> {
        let recipient = Self::recipient(trs)?;
        if !is_valid_address(&ctx.config.address_prefix, recipient) {
            return Err(TransactionError::asset(&trs.id, "invalid recipient"));
        }
        if trs.amount()?.is_zero() {
            return Err(TransactionError::InvalidAmount { id: trs.id.clone() });
        }
        Ok(())
    }

    fn get_bytes(&self, _trs: &Transaction) -> Result<Vec<u8>, TransactionError> {
        Ok(Vec::new())
    }

    fn apply(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        _sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let amount = trs.amount()?;
        let delta = AccountDelta {
            balance: Some(amount.credit()),
            u_balance: Some(amount.credit()),
            ..Default::default()
        }
        .in_block(block.id.clone(), ctx.rounds.calc(block.height));
        ctx.ledger.merge(Self::recipient(trs)?, &delta, scope)?;
        Ok(())
    }

    fn undo(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        _sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        let amount = trs.amount()?;
        let delta = AccountDelta {
            balance: Some(amount.debit()),
            u_balance: Some(amount.debit()),
            ..Default::default()
        }
        .in_block(block.id.clone(), ctx.rounds.calc(block.height));
        ctx.ledger.merge(Self::recipient(trs)?, &delta, scope)?;
        Ok(())
    }

    fn apply_unconfirmed(
        &self,
        _trs: &Transaction,
        _sender: &Account,
        _ctx: &PluginContext<'_>,
        _scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        Ok(())
    }

    fn undo_unconfirmed(
        &self,
        _trs: &Transaction,
        _sender: &Account,
        _ctx: &PluginContext<'_>,
        _scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        Ok(())
    }

    fn object_normalize(&self, trs: Transaction) -> Result<Transaction, TransactionError> {
        Self::recipient(&trs)?;
        Ok(trs)
    }

    fn supports_lock(&self) -> bool {
        true
    }
}
