//! The asset plugin contract and the type registry.
//!
//! Every transaction `type` is backed by one [`AssetPlugin`]. The engine
//! runs the checks common to all types and hands everything asset-specific
//! to the plugin: fee formula, asset validation, byte encoding, state
//! transitions, and persistence of the asset row.
//!
//! Plugins are registered once at startup. Dispatch on an unregistered tag
//! fails with [`TransactionError::UnknownType`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::amount::Amount;
use super::codec::TransactionCodec;
use super::error::TransactionError;
use super::types::{BlockRef, Transaction};
use crate::chain::RoundCalculator;
use crate::config::EngineConfig;
use crate::network::EventNotifier;
use crate::storage::{Account, Ledger, Row, Scope, TransactionStore};

/// Collaborators a plugin may use during a call.
#[derive(Clone, Copy)]
pub struct PluginContext<'a> {
    pub config: &'a EngineConfig,
    pub codec: &'a TransactionCodec,
    pub ledger: &'a dyn Ledger,
    pub rounds: &'a dyn RoundCalculator,
    pub store: &'a dyn TransactionStore,
    pub notifier: &'a dyn EventNotifier,
}

/// Where a plugin persists its asset rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetTable {
    pub name: &'static str,
    /// Column prefix used when the row is joined onto a transaction row
    /// (`m_` turns `min` into `m_min`).
    pub prefix: &'static str,
}

/// Capability set implemented by every transaction type.
pub trait AssetPlugin: Send + Sync {
    /// Integer tag this plugin is registered under.
    fn type_id(&self) -> u8;

    /// Key of this plugin's entry in [`Transaction::asset`].
    fn name(&self) -> &'static str;

    /// Fill the asset entry and any type-specific top-level fields.
    fn create(&self, params: &Value, trs: Transaction) -> Result<Transaction, TransactionError>;

    fn calculate_fee(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<Amount, TransactionError>;

    /// Asset-specific validation. Runs after every engine-level check.
    fn verify(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
    ) -> Result<(), TransactionError>;

    fn process(
        &self,
        trs: Transaction,
        _sender: &Account,
        _ctx: &PluginContext<'_>,
    ) -> Result<Transaction, TransactionError> {
        Ok(trs)
    }

    /// Asset tail of the canonical encoding. Empty for asset-less types.
    fn get_bytes(&self, trs: &Transaction) -> Result<Vec<u8>, TransactionError>;

    fn apply(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError>;

    fn undo(
        &self,
        trs: &Transaction,
        block: &BlockRef,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError>;

    fn apply_unconfirmed(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError>;

    fn undo_unconfirmed(
        &self,
        trs: &Transaction,
        sender: &Account,
        ctx: &PluginContext<'_>,
        scope: &mut Scope,
    ) -> Result<(), TransactionError>;

    /// Shape-check the asset entry.
    fn object_normalize(&self, trs: Transaction) -> Result<Transaction, TransactionError>;

    fn asset_table(&self) -> Option<AssetTable> {
        None
    }

    /// Rebuild the asset entry from a joined row, or `None` if the row
    /// carries no asset columns for this plugin.
    fn db_read(&self, _raw: &Row) -> Result<Option<Value>, TransactionError> {
        Ok(None)
    }

    fn db_save(
        &self,
        _trs: &Transaction,
        _ctx: &PluginContext<'_>,
        _scope: &mut Scope,
    ) -> Result<(), TransactionError> {
        Ok(())
    }

    /// Whether the collected companion signatures satisfy the sender's
    /// multisignature quorum. Accounts without a group are always ready.
    fn ready(&self, trs: &Transaction, sender: &Account) -> bool {
        if !sender.has_multisignatures() {
            return true;
        }
        trs.signatures.is_some() && trs.signature_count() as i64 >= sender.multimin - 1
    }

    /// Co-signer keys the transaction itself introduces. Companion
    /// signatures are checked against these when the sender has no
    /// confirmed group yet.
    fn companion_keys(&self, _trs: &Transaction) -> Result<Vec<String>, TransactionError> {
        Ok(Vec::new())
    }

    /// Whether the lock-height restriction applies to this type.
    fn supports_lock(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// AssetRegistry
// ---------------------------------------------------------------------------

/// Immutable map from type tag to plugin, built at startup.
#[derive(Clone, Default)]
pub struct AssetRegistry {
    plugins: BTreeMap<u8, Arc<dyn AssetPlugin>>,
}

impl fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<(u8, &str)> = self.plugins.iter().map(|(t, p)| (*t, p.name())).collect();
        f.debug_struct("AssetRegistry").field("plugins", &names).finish()
    }
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. A later registration for the same tag replaces the
    /// earlier one.
    pub fn register(mut self, plugin: Arc<dyn AssetPlugin>) -> Self {
        let type_id = plugin.type_id();
        if self.plugins.insert(type_id, plugin).is_some() {
            tracing::warn!(type_id, "asset plugin registered twice, keeping the last one");
        }
        self
    }

    pub fn get(&self, type_id: u8) -> Result<&Arc<dyn AssetPlugin>, TransactionError> {
        self.plugins
            .get(&type_id)
            .ok_or(TransactionError::UnknownType(type_id))
    }

    pub fn has_type(&self, type_id: u8) -> bool {
        self.plugins.contains_key(&type_id)
    }

    pub fn types(&self) -> impl Iterator<Item = u8> + '_ {
        self.plugins.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(u8);

    impl AssetPlugin for Dummy {
        fn type_id(&self) -> u8 {
            self.0
        }
        fn name(&self) -> &'static str {
            "dummy"
        }
        fn create(&self, _: &Value, trs: Transaction) -> Result<Transaction, TransactionError> {
            Ok(trs)
        }
        fn calculate_fee(
            &self,
            _: &Transaction,
            _: &Account,
            _: &PluginContext<'_>,
        ) -> Result<Amount, TransactionError> {
            Ok(Amount::zero())
        }
        fn verify(
            &self,
            _: &Transaction,
            _: &Account,
            _: &PluginContext<'_>,
        ) -> Result<(), TransactionError> {
            Ok(())
        }
        fn get_bytes(&self, _: &Transaction) -> Result<Vec<u8>, TransactionError> {
            Ok(Vec::new())
        }
        fn apply(
            &self,
            _: &Transaction,
            _: &BlockRef,
            _: &Account,
            _: &PluginContext<'_>,
            _: &mut Scope,
        ) -> Result<(), TransactionError> {
            Ok(())
        }
        fn undo(
            &self,
            _: &Transaction,
            _: &BlockRef,
            _: &Account,
            _: &PluginContext<'_>,
            _: &mut Scope,
        ) -> Result<(), TransactionError> {
            Ok(())
        }
        fn apply_unconfirmed(
            &self,
            _: &Transaction,
            _: &Account,
            _: &PluginContext<'_>,
            _: &mut Scope,
        ) -> Result<(), TransactionError> {
            Ok(())
        }
        fn undo_unconfirmed(
            &self,
            _: &Transaction,
            _: &Account,
            _: &PluginContext<'_>,
            _: &mut Scope,
        ) -> Result<(), TransactionError> {
            Ok(())
        }
        fn object_normalize(&self, trs: Transaction) -> Result<Transaction, TransactionError> {
            Ok(trs)
        }
    }

    #[test]
    fn unknown_tag_is_typed_error() {
        let reg = AssetRegistry::new().register(Arc::new(Dummy(3)));
        assert!(reg.has_type(3));
        assert!(reg.get(3).is_ok());
        assert!(matches!(reg.get(9), Err(TransactionError::UnknownType(9))));
        assert_eq!(reg.types().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn default_ready_rule_uses_multimin() {
        let plugin = Dummy(0);
        let mut trs = Transaction::new(0, "aa");
        let mut sender = Account::new("M1");
        assert!(plugin.ready(&trs, &sender));

        sender.multisignatures = vec!["k1".into(), "k2".into()];
        sender.multimin = 3;
        assert!(!plugin.ready(&trs, &sender));
        trs.signatures = Some(vec!["s1".into()]);
        assert!(!plugin.ready(&trs, &sender));
        trs.signatures = Some(vec!["s1".into(), "s2".into()]);
        assert!(plugin.ready(&trs, &sender));
    }
}
