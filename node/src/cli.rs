//! # CLI Interface
//!
//! Defines the command-line argument structure for `parcel-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use parcel_contracts::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};

use crate::logging::LogFormat;

/// Parcel property registry node.
///
/// Serves the registry over JSON-RPC, REST and WebSocket, and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "parcel-node",
    about = "Parcel property registry node",
    version,
    propagate_version = true
)]
pub struct ParcelNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the registry node.
    Run(RunArgs),
    /// Initialize a data directory and optionally seed approved payment
    /// methods from a JSON file.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the registry database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "PARCEL_DATA_DIR", default_value = ".parcel")]
    pub data_dir: PathBuf,

    /// Keep all state in memory. Nothing is written to `data_dir`.
    #[arg(long, env = "PARCEL_IN_MEMORY")]
    pub in_memory: bool,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "PARCEL_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PARCEL_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(
        long,
        env = "PARCEL_LOG_FORMAT",
        default_value = "pretty",
        value_parser = parse_log_format
    )]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "PARCEL_DATA_DIR", default_value = ".parcel")]
    pub data_dir: PathBuf,

    /// JSON file containing an array of payment-method identifiers to
    /// approve, e.g. `["0xA1", "0xB2"]`.
    #[arg(long, short = 'p')]
    pub payment_methods: Option<PathBuf>,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    Ok(LogFormat::from_str_lossy(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ParcelNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = ParcelNodeCli::try_parse_from(["parcel-node", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
                assert_eq!(args.metrics_port, DEFAULT_METRICS_PORT);
                assert!(!args.in_memory);
                assert_eq!(args.log_format, LogFormat::Pretty);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn init_accepts_payment_methods_file() {
        let cli = ParcelNodeCli::try_parse_from([
            "parcel-node",
            "init",
            "--payment-methods",
            "paymentMethods.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Init(args) => {
                assert_eq!(
                    args.payment_methods,
                    Some(PathBuf::from("paymentMethods.json"))
                );
            }
            other => panic!("expected init, got {other:?}"),
        }
    }
}
