// Copyright (c) 2026 Meridian Contributors. MIT License.
// See LICENSE for details.

//! # Meridian Node
//!
//! Entry point for the `meridian-node` binary. Parses CLI arguments,
//! initializes logging, and runs one of:
//!
//! - `keygen`: derive a keypair and address
//! - `process`: run a transaction file through an in-memory engine
//! - `version`: print build version information

mod batch;
mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use meridian_protocol::crypto::{address_from_public_key, Keypair};
use meridian_protocol::storage::Account;
use meridian_protocol::transaction::{BlockRef, Transaction};

use cli::{Commands, MeridianNodeCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MeridianNodeCli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVE, cli.log_format.into());

    match cli.command {
        Commands::Keygen(args) => keygen(args),
        Commands::Process(args) => process(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let config = batch::load_config(args.config.as_deref())?;

    let (keypair, secret_hex) = match &args.secret {
        Some(secret) => (Keypair::from_secret(secret), None),
        None => {
            let kp = Keypair::generate();
            let secret = hex::encode(kp.secret_key_bytes());
            (kp, Some(secret))
        }
    };
    let address = address_from_public_key(&config.address_prefix, &keypair.public_key());

    let out = json!({
        "public_key": keypair.public_key_hex(),
        "address": address,
        "secret_key": secret_hex,
    });
    println!("{}", serde_json::to_string_pretty(&out).context("failed to encode key")?);
    Ok(())
}

fn process(args: cli::ProcessArgs) -> Result<()> {
    let config = batch::load_config(args.config.as_deref())?;
    tracing::info!(nethash = %config.nethash, "starting meridian-node batch");

    let genesis: Vec<Account> = batch::load_json(&args.genesis, "genesis")?;
    let transactions: Vec<Transaction> = batch::load_json(&args.transactions, "transactions")?;

    let node = batch::build_node(config, genesis)?;
    let block = args.block_id.map(|id| BlockRef::new(id, args.height));
    let report = batch::run_batch(&node, transactions, block);

    tracing::info!(
        admitted = report.admitted.len(),
        rejected = report.rejected.len(),
        confirmed = report.confirmed.len(),
        "batch finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode report")?
    );
    Ok(())
}

fn print_version() {
    println!("meridian-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", meridian_protocol::config::PROTOCOL_VERSION);
    println!("rustc         {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
