//! Error taxonomy for the transaction core.
//!
//! Every failure the engine or a plugin can surface is a
//! [`TransactionError`]. [`TransactionError::kind`] groups the variants so
//! callers can decide what to do without matching on each one:
//!
//! | Kind             | Caller action                                   |
//! |------------------|-------------------------------------------------|
//! | `Validation`     | discard the transaction, never retry            |
//! | `Authentication` | discard the transaction, never retry            |
//! | `State`          | may resubmit later if the cause is transient    |
//! | `Infrastructure` | state was rolled back; caller picks retry policy |
//! | `BestEffort`     | logged only                                     |
//!
//! Broadcast and change-notification failures are the only `BestEffort`
//! errors. They never become a `TransactionError`; see [`crate::network`].

use thiserror::Error;

use super::amount::AmountError;
use crate::crypto::KeyError;
use crate::storage::{LedgerError, StoreError};

/// Coarse classification of a [`TransactionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    State,
    Infrastructure,
    BestEffort,
}

/// Errors raised while creating, verifying, or applying a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    // -- Validation ---------------------------------------------------------
    #[error("unknown transaction type {0}")]
    UnknownType(u8),

    #[error("invalid transaction asset: {id}: {reason}")]
    InvalidAsset { id: String, reason: String },

    #[error("invalid transaction amount: {id}")]
    InvalidAmount { id: String },

    #[error("invalid transaction type/fee: {id}")]
    InvalidFee { id: String },

    #[error("invalid amount string: {0}")]
    MalformedAmount(#[from] AmountError),

    #[error("invalid transaction timestamp")]
    InvalidTimestamp,

    #[error("transaction's nethash property is required")]
    MissingNethash,

    #[error("failed to verify nethash")]
    NethashMismatch,

    #[error("invalid sender id: {id}")]
    InvalidSenderId { id: String },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(#[from] KeyError),

    #[error("incorrect transaction id")]
    IncorrectId,

    #[error("invalid sender")]
    InvalidSender,

    #[error("invalid requester")]
    InvalidRequester,

    #[error("invalid block id")]
    InvalidBlockId,

    #[error("failed to normalize transaction: {0}")]
    Normalize(String),

    #[error("can't find keypair")]
    MissingKeypair,

    // -- Authentication -----------------------------------------------------
    #[error("failed to verify signature: {0}")]
    InvalidSignature(&'static str),

    #[error("failed to verify second signature: {id}")]
    InvalidSecondSignature { id: String },

    #[error("{0} account does not have a second signature")]
    UnexpectedSecondSignature(&'static str),

    #[error("encountered duplicate signatures")]
    DuplicateSignatures,

    #[error("failed to verify multisignature: {id}")]
    InvalidMultisignature { id: String },

    // -- State --------------------------------------------------------------
    #[error("insufficient balance: {address}")]
    InsufficientBalance { address: String },

    #[error("account is locked")]
    AccountLocked,

    #[error("ignoring already confirmed transaction")]
    AlreadyConfirmed,

    #[error("transaction {0} already exists, ignoring")]
    AlreadyPooled(String),

    #[error("too many transactions")]
    PoolFull,

    #[error("transaction is not ready: {id}")]
    NotReady { id: String },

    #[error("signature on this account is pending confirmation")]
    PendingConfirmation,

    #[error("account already has {0} enabled")]
    AlreadyEnabled(&'static str),

    // -- Infrastructure -----------------------------------------------------
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransactionError {
    /// Shorthand for [`TransactionError::InvalidAsset`].
    pub fn asset(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAsset {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Which taxonomy bucket this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownType(_)
            | Self::InvalidAsset { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidFee { .. }
            | Self::MalformedAmount(_)
            | Self::InvalidTimestamp
            | Self::MissingNethash
            | Self::NethashMismatch
            | Self::InvalidSenderId { .. }
            | Self::InvalidPublicKey(_)
            | Self::IncorrectId
            | Self::InvalidSender
            | Self::InvalidRequester
            | Self::InvalidBlockId
            | Self::Normalize(_)
            | Self::MissingKeypair => ErrorKind::Validation,

            Self::InvalidSignature(_)
            | Self::InvalidSecondSignature { .. }
            | Self::UnexpectedSecondSignature(_)
            | Self::DuplicateSignatures
            | Self::InvalidMultisignature { .. } => ErrorKind::Authentication,

            Self::InsufficientBalance { .. }
            | Self::AccountLocked
            | Self::AlreadyConfirmed
            | Self::AlreadyPooled(_)
            | Self::PoolFull
            | Self::NotReady { .. }
            | Self::PendingConfirmation
            | Self::AlreadyEnabled(_) => ErrorKind::State,

            Self::Ledger(_) | Self::Store(_) | Self::Serialization(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_taxonomy() {
        assert_eq!(TransactionError::UnknownType(99).kind(), ErrorKind::Validation);
        assert_eq!(
            TransactionError::DuplicateSignatures.kind(),
            ErrorKind::Authentication
        );
        assert_eq!(TransactionError::PoolFull.kind(), ErrorKind::State);
        assert_eq!(
            TransactionError::from(LedgerError::UnknownAccount("M1".into())).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn messages_carry_context() {
        let err = TransactionError::InsufficientBalance {
            address: "Mabc".to_string(),
        };
        assert_eq!(err.to_string(), "insufficient balance: Mabc");
        assert_eq!(
            TransactionError::asset("t1", "bad keysgroup").to_string(),
            "invalid transaction asset: t1: bad keysgroup"
        );
    }
}
