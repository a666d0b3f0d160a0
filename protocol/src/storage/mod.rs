//! # Storage Module
//!
//! The persistence contracts the transaction core consumes, plus in-memory
//! implementations good enough to run a node in batch mode and to test
//! against.
//!
//! ## Architecture
//!
//! ```text
//! scope.rs    - Scope: journal of compensations, atomically()
//! account.rs  - Account, AccountDelta merge rules, Ledger trait
//! dao.rs      - Row, TransactionStore trait (insert / count / find)
//! memory.rs   - MemoryLedger, MemoryStore
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! engine.apply ──► Ledger::merge ──────┐
//!      │                               ├──► Scope ──► commit | rollback
//!      └────► plugin.apply / db_save ──┘
//! ```
//!
//! ## Design Decisions
//!
//! 1. **Writes are eager, rollback is journaled.** A store applies a write
//!    immediately and pushes its compensation into the scope. There is no
//!    staging buffer to read through, so post-merge views are always real.
//!
//! 2. **Calls are synchronous.** The core sees call/result; a networked
//!    backend is free to block on its own runtime inside the trait impl.

pub mod account;
pub mod dao;
pub mod memory;
pub mod scope;

pub use account::{Account, AccountDelta, AccountFields, Ledger, LedgerError};
pub use dao::{filter, Row, StoreError, TransactionStore};
pub use memory::{MemoryLedger, MemoryStore};
pub use scope::{atomically, Scope};
