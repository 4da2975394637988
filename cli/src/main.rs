//! ChainStream CLI — irreversible block statistics over the firehose.
//!
//! # Commands
//! ```text
//! chainstream stats --start-date <RFC3339> --stop-date <RFC3339> [--include <expr>] [--exclude <expr>]
//! chainstream serve [--addr 0.0.0.0:3000]
//! chainstream info
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chainstream_core::{FilterExpression, Interrupt};
use chainstream_firehose::{FirehoseConfig, FirehoseServices};
use clap::{Parser, Subcommand};

mod api;
mod logging;
mod stats;

#[derive(Parser)]
#[command(
    name = "chainstream",
    about = "Transaction statistics over irreversible EOSIO blocks",
    long_about = "
ChainStream CLI: resolve a date window to blocks, stream them from a firehose
endpoint and report transaction, action and resource usage totals.

ENVIRONMENT VARIABLES:
  DFUSE_TOKEN              API key (required)
  DFUSE_FIREHOSE_NETWORK   gRPC stream host (required)
  DFUSE_DFUSE_NETWORK      REST lookup host (required)
  EXIT_TIMEOUT_MS          grace interval after a stream exits (required)
  DFUSE_AUTH_URL           token endpoint
  FIREHOSE_PORT            gRPC port (default 9000)
  RESTART_DELAY_MS         back-off before a restart (default 3000)
  LOG_LEVEL / RUST_LOG     log filter (default info)
  LOG_FORMAT               text | json
",
    version
)]
struct Cli {
    /// Enable debug logging for the stream engine
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a date window and print its statistics as JSON
    Stats {
        /// Window start (RFC 3339, e.g. 2022-08-09T06:00:00Z)
        #[arg(long)]
        start_date: String,
        /// Window end (RFC 3339)
        #[arg(long)]
        stop_date: String,
        /// Server-side include filter expression
        #[arg(long, default_value = stats::DEFAULT_INCLUDE)]
        include: String,
        /// Server-side exclude filter expression
        #[arg(long, default_value = stats::DEFAULT_EXCLUDE)]
        exclude: String,
    },

    /// Serve GET /api/transactions
    Serve {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: SocketAddr,
    },

    /// Print the effective configuration (secrets hidden)
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogConfig::from_env().verbose(cli.verbose));

    match cli.command {
        Commands::Stats {
            start_date,
            stop_date,
            include,
            exclude,
        } => cmd_stats(&start_date, &stop_date, FilterExpression::new(include, exclude)).await,
        Commands::Serve { addr } => cmd_serve(addr).await,
        Commands::Info => cmd_info(),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn load_services() -> Result<FirehoseServices> {
    let config = FirehoseConfig::from_env().context("loading configuration")?;
    FirehoseServices::new(config).context("building service clients")
}

/// Trigger `interrupt` with "SIGINT" on Ctrl-C.
fn forward_ctrl_c(interrupt: Interrupt) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT");
            interrupt.trigger("SIGINT");
        }
    });
}

async fn cmd_stats(start_date: &str, stop_date: &str, filter: FilterExpression) -> Result<()> {
    let services = load_services()?;
    let interrupt = Interrupt::new();
    forward_ctrl_c(interrupt.clone());

    let result = async {
        let resolved = services
            .lookup
            .resolve(start_date, stop_date)
            .await
            .context("resolving date window")?;
        let resumer = services.resumer(interrupt);
        stats::collect(&resumer, resolved, filter).await
    }
    .await;

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            // The payload goes to stdout; returning the error sets exit code 1.
            println!("{}", serde_json::to_string_pretty(&stats::ErrorReport::from(&e))?);
            Err(e)
        }
    }
}

async fn cmd_serve(addr: SocketAddr) -> Result<()> {
    let services = load_services()?;
    let interrupt = Interrupt::new();
    let state = Arc::new(api::AppState {
        services,
        interrupt: interrupt.clone(),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "serving /api/transactions");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received SIGINT, draining requests");
            }
            interrupt.trigger("SIGINT");
        })
        .await
        .context("serving HTTP")
}

fn cmd_info() -> Result<()> {
    let config = FirehoseConfig::from_env().context("loading configuration")?;
    println!("ChainStream v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Stream endpoint : {}", config.firehose_endpoint());
    println!("Lookup endpoint : {}", config.dfuse_base_url());
    println!("Token endpoint  : {}", config.auth_url);
    println!("Exit grace      : {} ms", config.exit_timeout_ms);
    println!("Restart delay   : {} ms", config.restart_delay_ms);
    println!("Default filters : include={:?} exclude={:?}", stats::DEFAULT_INCLUDE, stats::DEFAULT_EXCLUDE);
    Ok(())
}
