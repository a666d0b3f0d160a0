//! # CLI Interface
//!
//! Command-line structure for `meridian-node`, built with `clap` derive.
//! Three subcommands: `keygen`, `process`, and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Meridian transaction core node.
///
/// Runs the transaction engine against an in-memory ledger: seed accounts
/// from a genesis file, push a batch of signed transactions through the
/// unconfirmed pool, and optionally confirm them into a block.
#[derive(Parser, Debug)]
#[command(
    name = "meridian-node",
    about = "Meridian transaction core node",
    version,
    propagate_version = true
)]
pub struct MeridianNodeCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "MERIDIAN_LOG_FORMAT", default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Derive a keypair and its address from a passphrase.
    Keygen(KeygenArgs),
    /// Feed a transaction file through the engine and print a report.
    Process(ProcessArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Passphrase to derive the key from. A random key is generated when
    /// omitted.
    #[arg(long, env = "MERIDIAN_SECRET")]
    pub secret: Option<String>,

    /// Engine configuration (JSON). Only `address_prefix` is used here.
    #[arg(long, short = 'c', env = "MERIDIAN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Engine configuration (JSON). Defaults apply when omitted or missing.
    #[arg(long, short = 'c', env = "MERIDIAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON array of genesis accounts to seed the ledger with.
    #[arg(long, short = 'g')]
    pub genesis: PathBuf,

    /// JSON array of signed transactions.
    #[arg(long, short = 't')]
    pub transactions: PathBuf,

    /// Confirm every admitted transaction into a block with this id.
    #[arg(long)]
    pub block_id: Option<String>,

    /// Height of the confirming block.
    #[arg(long, default_value_t = 1)]
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}
