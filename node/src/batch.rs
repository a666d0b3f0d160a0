//! # Batch Processing
//!
//! Wires an in-memory [`TransactionEngine`] from a config and a genesis
//! allocation, then drives a list of transactions through pool admission
//! and, optionally, block confirmation.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use meridian_protocol::assets::default_registry;
use meridian_protocol::config::EngineConfig;
use meridian_protocol::crypto::address_from_hex;
use meridian_protocol::storage::{Account, MemoryLedger, MemoryStore};
use meridian_protocol::transaction::{BlockRef, EngineServices, Transaction, TransactionEngine};

/// Outcome of one `process` run, printed as JSON on stdout.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub admitted: Vec<String>,
    pub confirmed: Vec<String>,
    pub rejected: Vec<Rejection>,
    pub pool_size: usize,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub id: Option<String>,
    pub stage: &'static str,
    pub kind: String,
    pub error: String,
}

/// Engine plus handles on its in-memory backends.
pub struct Node {
    pub engine: TransactionEngine,
    pub ledger: MemoryLedger,
    pub store: MemoryStore,
}

/// Read an [`EngineConfig`]. No path, or a path that does not exist,
/// yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(EngineConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid {what} file {}", path.display()))
}

/// Build a node whose ledger holds `genesis`. Accounts listed by public key
/// only get their address derived.
pub fn build_node(config: EngineConfig, genesis: Vec<Account>) -> Result<Node> {
    let ledger = MemoryLedger::new(config.address_prefix.clone());
    let store = MemoryStore::new();

    for mut account in genesis {
        if account.address.is_empty() {
            let pk = account
                .public_key
                .as_deref()
                .context("genesis account needs an address or a public_key")?;
            account.address = address_from_hex(&config.address_prefix, pk)
                .with_context(|| format!("bad genesis public key {pk}"))?;
        }
        ledger.insert_account(account);
    }
    info!(accounts = ledger.len(), "genesis ledger seeded");

    let mut services = EngineServices::in_memory(&config);
    services.ledger = Arc::new(ledger.clone());
    services.store = Arc::new(store.clone());

    Ok(Node {
        engine: TransactionEngine::new(config, default_registry(), services),
        ledger,
        store,
    })
}

/// Admit each transaction in order; then, if `block` is given, confirm the
/// whole pool into it. A rejection never stops the batch.
pub fn run_batch(node: &Node, transactions: Vec<Transaction>, block: Option<BlockRef>) -> BatchReport {
    let engine = &node.engine;
    let mut admitted = Vec::new();
    let mut rejected = Vec::new();

    for (index, trs) in transactions.into_iter().enumerate() {
        let id = Some(trs.id.clone()).filter(|id| !id.is_empty());
        let result = engine
            .object_normalize(trs)
            .and_then(|trs| engine.process_unconfirmed_transaction(trs, false));
        match result {
            Ok(trs) => admitted.push(trs.id),
            Err(e) => rejected.push(Rejection {
                index,
                id,
                stage: "admit",
                kind: format!("{:?}", e.kind()),
                error: e.to_string(),
            }),
        }
    }

    let mut confirmed = Vec::new();
    if let Some(block) = block {
        for (index, trs) in engine
            .get_unconfirmed_transaction_list(false, None)
            .into_iter()
            .enumerate()
        {
            match engine.commit_transaction(&trs, &block) {
                Ok(trs) => confirmed.push(trs.id),
                Err(e) => rejected.push(Rejection {
                    index,
                    id: Some(trs.id),
                    stage: "commit",
                    kind: format!("{:?}", e.kind()),
                    error: e.to_string(),
                }),
            }
        }
        info!(%block, confirmed = confirmed.len(), "block committed");
    }

    BatchReport {
        admitted,
        confirmed,
        rejected,
        pool_size: engine.unconfirmed_count(),
        accounts: node.ledger.accounts(),
    }
}
