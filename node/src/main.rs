// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Parcel Registry Node
//!
//! Entry point for the `parcel-node` binary. Parses CLI arguments, initializes
//! logging and metrics, opens the registry, and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the registry node
//! - `init`    — initialize a data directory and seed payment methods
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use parcel_contracts::storage::ParcelDB;
use parcel_contracts::{PaymentMethod, PropertyMarket};

use cli::{Commands, ParcelNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ParcelNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the sled database under `data_dir/db` and restores the registry.
fn open_market(data_dir: &Path) -> Result<PropertyMarket> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = ParcelDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    PropertyMarket::open(db).context("failed to restore registry state")
}

/// Starts the registry node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::RUN_FILTER, args.log_format);

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        in_memory = args.in_memory,
        "starting parcel-node"
    );

    // --- Registry ---
    let market = if args.in_memory {
        tracing::warn!("running in memory, registry state will not survive a restart");
        PropertyMarket::new()
    } else {
        open_market(&args.data_dir)?
    };
    let market = Arc::new(market);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.observe_market(&market);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (registry {})",
            env!("CARGO_PKG_VERSION"),
            parcel_contracts::config::REGISTRY_VERSION,
        ),
        market: Arc::clone(&market),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(metrics::MetricsState {
            metrics: Arc::clone(&node_metrics),
            market: Arc::clone(&market),
        });
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!(
        properties = market.property_count(),
        payment_methods = market.payment_method_count(),
        "parcel-node stopped"
    );
    Ok(())
}

/// Initializes a data directory and optionally approves payment methods
/// read from a JSON array file.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(logging::INIT_FILTER, LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    let market = open_market(data_dir)?;

    if let Some(path) = &args.payment_methods {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let methods: Vec<PaymentMethod> = serde_json::from_str(&raw).with_context(|| {
            format!("{} must contain a JSON array of identifiers", path.display())
        })?;
        let seeded = methods.len();
        market.add_payment_methods(methods).with_context(|| {
            format!("failed to approve payment methods from {}", path.display())
        })?;
        tracing::info!(seeded, "payment methods approved");
    }

    println!("Node initialized successfully.");
    println!("  Data directory  : {}", data_dir.display());
    println!("  Payment methods : {}", market.payment_method_count());
    println!("  Properties      : {}", market.property_count());

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("parcel-node {}", env!("CARGO_PKG_VERSION"));
    println!("registry    {}", parcel_contracts::config::REGISTRY_VERSION);
    println!(
        "schema      {}",
        parcel_contracts::config::STORAGE_SCHEMA_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
