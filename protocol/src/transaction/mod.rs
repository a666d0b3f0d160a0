//! # Transaction Module
//!
//! The transaction core: data model, canonical codec, the asset plugin
//! contract, the engine that drives every transaction through its
//! lifecycle, and the unconfirmed pool.
//!
//! ## Architecture
//!
//! ```text
//! types.rs   - Transaction, BlockRef, AssetMap
//! amount.rs  - arbitrary-precision base-unit amounts
//! codec.rs   - canonical bytes, id, sign / verify
//! plugin.rs  - AssetPlugin trait and AssetRegistry
//! engine.rs  - TransactionEngine (process, verify, apply, undo, pool admission)
//! pool.rs    - UnconfirmedPool, BalanceCache, AddressLocks
//! error.rs   - TransactionError and its ErrorKind taxonomy
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Create**: [`TransactionEngine::create`] fills the asset, signs and
//!    assigns the id.
//! 2. **Admit**: [`TransactionEngine::process_unconfirmed_transaction`]
//!    processes, verifies, applies to the unconfirmed ledger fields and
//!    pools the transaction.
//! 3. **Confirm**: on block commit the transaction is applied to the
//!    confirmed fields and persisted.
//! 4. **Revert**: reorgs run `undo` / `undo_unconfirmed` in reverse.
//!
//! ## Design Decisions
//!
//! - Amounts are decimal strings on the wire and [`Amount`] (a `BigUint`)
//!   in arithmetic. No floating point anywhere near balances.
//! - The id is the SHA-256 of the full canonical encoding and is always
//!   recomputed, never trusted.

pub mod amount;
pub mod codec;
pub mod engine;
pub mod error;
pub mod plugin;
pub mod pool;
pub mod types;

pub use amount::{Amount, AmountError};
pub use codec::TransactionCodec;
pub use engine::{CreateRequest, EngineServices, TransactionEngine};
pub use error::{ErrorKind, TransactionError};
pub use plugin::{AssetPlugin, AssetRegistry, AssetTable, PluginContext};
pub use pool::{AddressLocks, BalanceCache, UnconfirmedPool};
pub use types::{AssetMap, BlockRef, Transaction};
