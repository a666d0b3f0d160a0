// Copyright (c) 2026 Meridian Contributors. MIT License.
// See LICENSE for details.

//! # Meridian Protocol: Transaction Core
//!
//! Everything a Meridian node needs to accept, validate and settle
//! transactions. Blocks, consensus and peer discovery live elsewhere; this
//! crate talks to them through small traits.
//!
//! ## Architecture
//!
//! - **config**: protocol constants and [`config::EngineConfig`].
//! - **crypto**: Ed25519 keys, SHA-256, address derivation.
//! - **transaction**: data model, canonical codec, engine, unconfirmed pool.
//! - **assets**: the built-in asset plugins (transfer, second signature,
//!   multisignature).
//! - **storage**: account ledger and row store contracts, scopes, in-memory
//!   backends.
//! - **chain**: slot clock, round calculator, chain tip.
//! - **network**: broadcast and change notification.
//!
//! ## Design Philosophy
//!
//! 1. One canonical byte encoding. Ids and signatures both commit to it.
//! 2. Type-specific behaviour is a plugin, never a branch in the engine.
//! 3. Every state change happens inside a scope that can roll it back.

pub mod assets;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod network;
pub mod storage;
pub mod transaction;

pub use transaction::{Transaction, TransactionEngine, TransactionError};
