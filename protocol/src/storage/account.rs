//! Account model and the ledger contract.
//!
//! The ledger is the sole owner of durable balances. The transaction core
//! never writes an [`Account`] directly; it asks the [`Ledger`] to merge an
//! [`AccountDelta`] and works with the post-merge view it gets back.
//!
//! ## Merge semantics
//!
//! | Field kind                         | Merge rule                    |
//! |------------------------------------|-------------------------------|
//! | balances, `multimin`, lifetimes    | delta is added                |
//! | `multisignatures` lists            | `+key` inserts, `-key` removes |
//! | flags, `second_public_key`, tags   | delta overwrites              |
//!
//! Inserting a key that is already present or removing one that is absent
//! is an [`LedgerError::InvalidDiff`]: a diff that cannot be applied
//! exactly cannot be reversed exactly either.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scope::Scope;
use crate::transaction::amount::bigint_string;

/// Errors raised by a [`Ledger`] implementation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("invalid diff on {field}: {entry}")]
    InvalidDiff { field: &'static str, entry: String },

    #[error("invalid public key for address derivation: {0}")]
    InvalidPublicKey(String),

    #[error("ledger backend failure: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Ledger state of one address.
///
/// Every `u_`-prefixed field is the unconfirmed mirror of its confirmed
/// counterpart: pool admissions move the mirror, block commits move the
/// confirmed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub address: String,
    pub public_key: Option<String>,

    #[serde(with = "bigint_string")]
    pub balance: BigInt,
    #[serde(with = "bigint_string")]
    pub u_balance: BigInt,

    pub second_signature: bool,
    pub u_second_signature: bool,
    pub second_public_key: Option<String>,

    /// Registered co-signer public keys (hex, no operator prefix).
    pub multisignatures: Vec<String>,
    pub u_multisignatures: Vec<String>,
    pub multimin: i64,
    pub u_multimin: i64,
    pub multilifetime: i64,
    pub u_multilifetime: i64,

    /// Height up to which lock-restricted transaction types are refused.
    pub lock_height: u64,

    pub block_id: Option<String>,
    pub round: Option<u64>,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Account with an identical confirmed and unconfirmed balance, as a
    /// genesis allocation produces.
    pub fn with_balance(address: impl Into<String>, balance: impl Into<BigInt>) -> Self {
        let balance = balance.into();
        Self {
            address: address.into(),
            u_balance: balance.clone(),
            balance,
            ..Default::default()
        }
    }

    pub fn has_multisignatures(&self) -> bool {
        !self.multisignatures.is_empty()
    }

    /// Fold `delta` into this account, or leave it untouched and fail if a
    /// list diff cannot be applied exactly.
    pub fn apply_delta(&mut self, delta: &AccountDelta) -> Result<(), LedgerError> {
        let mut next = self.clone();

        if let Some(d) = &delta.balance {
            next.balance += d;
        }
        if let Some(d) = &delta.u_balance {
            next.u_balance += d;
        }
        if let Some(flag) = delta.second_signature {
            next.second_signature = flag;
        }
        if let Some(flag) = delta.u_second_signature {
            next.u_second_signature = flag;
        }
        if let Some(key) = &delta.second_public_key {
            next.second_public_key = key.clone();
        }
        if let Some(diff) = &delta.multisignatures {
            apply_list_diff("multisignatures", &mut next.multisignatures, diff)?;
        }
        if let Some(diff) = &delta.u_multisignatures {
            apply_list_diff("u_multisignatures", &mut next.u_multisignatures, diff)?;
        }
        next.multimin += delta.multimin.unwrap_or(0);
        next.u_multimin += delta.u_multimin.unwrap_or(0);
        next.multilifetime += delta.multilifetime.unwrap_or(0);
        next.u_multilifetime += delta.u_multilifetime.unwrap_or(0);
        if let Some(block_id) = &delta.block_id {
            next.block_id = Some(block_id.clone());
        }
        if let Some(round) = delta.round {
            next.round = Some(round);
        }

        *self = next;
        Ok(())
    }
}

fn apply_list_diff(
    field: &'static str,
    list: &mut Vec<String>,
    diff: &[String],
) -> Result<(), LedgerError> {
    for entry in diff {
        let invalid = || LedgerError::InvalidDiff {
            field,
            entry: entry.clone(),
        };
        if let Some(key) = entry.strip_prefix('+') {
            if list.iter().any(|k| k == key) {
                return Err(invalid());
            }
            list.push(key.to_string());
        } else if let Some(key) = entry.strip_prefix('-') {
            let pos = list.iter().position(|k| k == key).ok_or_else(invalid)?;
            list.remove(pos);
        } else {
            return Err(invalid());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AccountDelta
// ---------------------------------------------------------------------------

/// A merge request against one account. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountDelta {
    pub balance: Option<BigInt>,
    pub u_balance: Option<BigInt>,
    pub second_signature: Option<bool>,
    pub u_second_signature: Option<bool>,
    /// `Some(None)` clears the key.
    pub second_public_key: Option<Option<String>>,
    pub multisignatures: Option<Vec<String>>,
    pub u_multisignatures: Option<Vec<String>>,
    pub multimin: Option<i64>,
    pub u_multimin: Option<i64>,
    pub multilifetime: Option<i64>,
    pub u_multilifetime: Option<i64>,
    pub block_id: Option<String>,
    pub round: Option<u64>,
}

impl AccountDelta {
    pub fn balance(delta: BigInt) -> Self {
        Self {
            balance: Some(delta),
            ..Default::default()
        }
    }

    pub fn u_balance(delta: BigInt) -> Self {
        Self {
            u_balance: Some(delta),
            ..Default::default()
        }
    }

    /// Tag the merge with the block and round it belongs to.
    pub fn in_block(mut self, block_id: impl Into<String>, round: u64) -> Self {
        self.block_id = Some(block_id.into());
        self.round = Some(round);
        self
    }
}

// ---------------------------------------------------------------------------
// AccountFields
// ---------------------------------------------------------------------------

/// Fields for [`Ledger::set_account`]. The address is derived from
/// `public_key` when not given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFields {
    pub address: Option<String>,
    pub public_key: Option<String>,
    pub block_id: Option<String>,
}

impl AccountFields {
    pub fn for_public_key(public_key: impl Into<String>) -> Self {
        Self {
            public_key: Some(public_key.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The account store consumed by the transaction core.
///
/// Every write takes the caller's [`Scope`] and must register a
/// compensation in it so the surrounding unit of work can roll back.
pub trait Ledger: Send + Sync {
    /// Address derived from a hex public key.
    fn generate_address_by_public_key(&self, public_key: &str) -> Result<String, LedgerError>;

    fn get_account(&self, address: &str) -> Result<Option<Account>, LedgerError>;

    fn get_account_by_public_key(&self, public_key: &str) -> Result<Option<Account>, LedgerError>;

    /// Create the account if absent, then overwrite the given tag fields.
    fn set_account(&self, fields: AccountFields, scope: &mut Scope) -> Result<Account, LedgerError>;

    /// Apply `delta` to the account at `address` (creating it if absent)
    /// and return the post-merge view.
    fn merge(
        &self,
        address: &str,
        delta: &AccountDelta,
        scope: &mut Scope,
    ) -> Result<Account, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields_add() {
        let mut acct = Account::with_balance("M1", 100);
        acct.apply_delta(&AccountDelta::u_balance(BigInt::from(-40)))
            .unwrap();
        assert_eq!(acct.u_balance, BigInt::from(60));
        assert_eq!(acct.balance, BigInt::from(100));
    }

    #[test]
    fn list_diff_inserts_and_removes() {
        let mut acct = Account::new("M1");
        let add = AccountDelta {
            multisignatures: Some(vec!["+aa".into(), "+bb".into()]),
            multimin: Some(2),
            ..Default::default()
        };
        acct.apply_delta(&add).unwrap();
        assert_eq!(acct.multisignatures, vec!["aa", "bb"]);
        assert_eq!(acct.multimin, 2);

        let remove = AccountDelta {
            multisignatures: Some(vec!["-aa".into()]),
            multimin: Some(-2),
            ..Default::default()
        };
        acct.apply_delta(&remove).unwrap();
        assert_eq!(acct.multisignatures, vec!["bb"]);
        assert_eq!(acct.multimin, 0);
    }

    #[test]
    fn failed_diff_leaves_account_untouched() {
        let mut acct = Account::with_balance("M1", 5);
        let before = acct.clone();
        let bad = AccountDelta {
            balance: Some(BigInt::from(-5)),
            multisignatures: Some(vec!["-missing".into()]),
            ..Default::default()
        };
        assert!(matches!(
            acct.apply_delta(&bad),
            Err(LedgerError::InvalidDiff { field: "multisignatures", .. })
        ));
        assert_eq!(acct, before);

        let dup = AccountDelta {
            u_multisignatures: Some(vec!["+aa".into(), "+aa".into()]),
            ..Default::default()
        };
        assert!(acct.apply_delta(&dup).is_err());
        assert!(acct.apply_delta(&AccountDelta {
            multisignatures: Some(vec!["aa".into()]),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn tags_overwrite() {
        let mut acct = Account::new("M1");
        acct.apply_delta(&AccountDelta::balance(BigInt::from(1)).in_block("b1", 3))
            .unwrap();
        acct.apply_delta(&AccountDelta::balance(BigInt::from(1)).in_block("b2", 4))
            .unwrap();
        assert_eq!(acct.block_id.as_deref(), Some("b2"));
        assert_eq!(acct.round, Some(4));

        acct.apply_delta(&AccountDelta {
            second_signature: Some(true),
            second_public_key: Some(Some("cc".into())),
            ..Default::default()
        })
        .unwrap();
        acct.apply_delta(&AccountDelta {
            second_signature: Some(false),
            second_public_key: Some(None),
            ..Default::default()
        })
        .unwrap();
        assert!(!acct.second_signature);
        assert!(acct.second_public_key.is_none());
    }

    #[test]
    fn account_json_keeps_big_balances_as_strings() {
        let acct = Account::with_balance("M1", 7);
        let json = serde_json::to_value(&acct).unwrap();
        assert_eq!(json["balance"], "7");
        let back: Account = serde_json::from_value(json).unwrap();
        assert_eq!(back, acct);
    }
}
