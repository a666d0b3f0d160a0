//! In-memory reference implementations of [`Ledger`] and
//! [`TransactionStore`].
//!
//! Used by the node's batch mode and by the test suites. Both register
//! compensations in the caller's [`Scope`] so that a rolled-back unit of
//! work leaves no trace.
//!
//! Ledger compensations apply the inverse delta instead of restoring a
//! snapshot, so a rollback on one account never erases a concurrent merge
//! from another scope that touched the same address.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::error;

use super::account::{Account, AccountDelta, AccountFields, Ledger, LedgerError};
use super::dao::{row_matches, Row, StoreError, TransactionStore};
use super::scope::Scope;
use crate::assets::diff::reverse;
use crate::crypto::address_from_hex;

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// Account store backed by a concurrent map.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    prefix: String,
    accounts: Arc<DashMap<String, Account>>,
}

impl MemoryLedger {
    pub fn new(address_prefix: impl Into<String>) -> Self {
        Self {
            prefix: address_prefix.into(),
            accounts: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace an account outside of any scope. Genesis seeding
    /// and fixtures only.
    pub fn insert_account(&self, account: Account) {
        self.accounts.insert(account.address.clone(), account);
    }

    /// Snapshot of every account, sorted by address.
    pub fn accounts(&self) -> Vec<Account> {
        let mut all: Vec<Account> = self.accounts.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        all
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// The delta that exactly undoes `delta` on an account whose pre-merge
/// state was `before`.
fn inverse_delta(delta: &AccountDelta, before: &Account) -> AccountDelta {
    // Undo the newest entry first.
    let flip = |diff: &Vec<String>| -> Vec<String> {
        let newest_first: Vec<String> = diff.iter().rev().cloned().collect();
        reverse(&newest_first)
    };

    AccountDelta {
        balance: delta.balance.as_ref().map(|d| -d),
        u_balance: delta.u_balance.as_ref().map(|d| -d),
        second_signature: delta.second_signature.map(|_| before.second_signature),
        u_second_signature: delta.u_second_signature.map(|_| before.u_second_signature),
        second_public_key: delta
            .second_public_key
            .as_ref()
            .map(|_| before.second_public_key.clone()),
        multisignatures: delta.multisignatures.as_ref().map(flip),
        u_multisignatures: delta.u_multisignatures.as_ref().map(flip),
        multimin: delta.multimin.map(|d| -d),
        u_multimin: delta.u_multimin.map(|d| -d),
        multilifetime: delta.multilifetime.map(|d| -d),
        u_multilifetime: delta.u_multilifetime.map(|d| -d),
        // Tags are restored below; `None` here means "untouched".
        block_id: None,
        round: None,
    }
}

impl Ledger for MemoryLedger {
    fn generate_address_by_public_key(&self, public_key: &str) -> Result<String, LedgerError> {
        address_from_hex(&self.prefix, public_key)
            .map_err(|_| LedgerError::InvalidPublicKey(public_key.to_string()))
    }

    fn get_account(&self, address: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self.accounts.get(address).map(|a| a.value().clone()))
    }

    fn get_account_by_public_key(&self, public_key: &str) -> Result<Option<Account>, LedgerError> {
        let address = self.generate_address_by_public_key(public_key)?;
        self.get_account(&address)
    }

    fn set_account(&self, fields: AccountFields, scope: &mut Scope) -> Result<Account, LedgerError> {
        let address = match (&fields.address, &fields.public_key) {
            (Some(address), _) => address.clone(),
            (None, Some(pk)) => self.generate_address_by_public_key(pk)?,
            (None, None) => return Err(LedgerError::UnknownAccount(String::new())),
        };

        let (previous, updated) = match self.accounts.entry(address.clone()) {
            Entry::Occupied(mut e) => {
                let prev = e.get().clone();
                let acct = e.get_mut();
                if fields.public_key.is_some() {
                    acct.public_key = fields.public_key.clone();
                }
                if fields.block_id.is_some() {
                    acct.block_id = fields.block_id.clone();
                }
                (Some(prev), acct.clone())
            }
            Entry::Vacant(v) => {
                let mut acct = Account::new(address.clone());
                acct.public_key = fields.public_key.clone();
                acct.block_id = fields.block_id.clone();
                v.insert(acct.clone());
                (None, acct)
            }
        };

        let accounts = Arc::clone(&self.accounts);
        scope.on_rollback(move || match previous {
            None => {
                accounts.remove(&address);
            }
            Some(prev) => {
                if let Some(mut acct) = accounts.get_mut(&address) {
                    acct.public_key = prev.public_key;
                    acct.block_id = prev.block_id;
                }
            }
        });

        Ok(updated)
    }

    fn merge(
        &self,
        address: &str,
        delta: &AccountDelta,
        scope: &mut Scope,
    ) -> Result<Account, LedgerError> {
        let (before, created, updated) = match self.accounts.entry(address.to_string()) {
            Entry::Occupied(mut e) => {
                let before = e.get().clone();
                e.get_mut().apply_delta(delta)?;
                (before, false, e.get().clone())
            }
            Entry::Vacant(v) => {
                let before = Account::new(address);
                let mut acct = before.clone();
                acct.apply_delta(delta)?;
                v.insert(acct.clone());
                (before, true, acct)
            }
        };

        let inverse = inverse_delta(delta, &before);
        let restore_tags = delta.block_id.is_some() || delta.round.is_some();
        let accounts = Arc::clone(&self.accounts);
        let address = address.to_string();
        scope.on_rollback(move || {
            let Some(mut acct) = accounts.get_mut(&address) else {
                error!(%address, "rollback target vanished from ledger");
                return;
            };
            if let Err(e) = acct.apply_delta(&inverse) {
                error!(%address, error = %e, "failed to roll back account merge");
                return;
            }
            if restore_tags {
                acct.block_id = before.block_id.clone();
                acct.round = before.round;
            }
            let pristine = created && *acct == Account::new(address.clone());
            drop(acct);
            if pristine {
                accounts.remove(&address);
            }
        });

        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Table store backed by per-table row vectors. Rows carrying an `id`
/// column are unique on it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<DashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }
}

impl TransactionStore for MemoryStore {
    fn insert(&self, table: &str, row: Row, scope: &mut Scope) -> Result<(), StoreError> {
        {
            let mut rows = self.tables.entry(table.to_string()).or_default();
            if let Some(id) = row.get("id") {
                if rows.iter().any(|r| r.get("id") == Some(id)) {
                    return Err(StoreError::Duplicate {
                        table: table.to_string(),
                        key: id.to_string(),
                    });
                }
            }
            rows.push(row.clone());
        }

        let tables = Arc::clone(&self.tables);
        let table = table.to_string();
        scope.on_rollback(move || {
            if let Some(mut rows) = tables.get_mut(&table) {
                if let Some(pos) = rows.iter().rposition(|r| *r == row) {
                    rows.remove(pos);
                }
            }
        });
        Ok(())
    }

    fn count(&self, table: &str, filter: &Row) -> Result<usize, StoreError> {
        Ok(self.tables.get(table).map_or(0, |rows| {
            rows.iter().filter(|r| row_matches(r, filter)).count()
        }))
    }

    fn find(&self, table: &str, filter: &Row) -> Result<Vec<Row>, StoreError> {
        Ok(self.tables.get(table).map_or_else(Vec::new, |rows| {
            rows.iter().filter(|r| row_matches(r, filter)).cloned().collect()
        }))
    }
}
