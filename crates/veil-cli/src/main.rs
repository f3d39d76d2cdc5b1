//! Veil CLI
//!
//! Drives the session core against the simulated transport: inspect the
//! server catalog, pick the best server, and run a full
//! connect/traffic/disconnect cycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use veil_core::{
    format_bytes, AlwaysReachable, ConnectionSessionManager, ServerCatalog, VeilConfig,
};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "veil")]
#[command(version, about = "VPN client session core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the catalog and the quick-connect servers
    Servers,

    /// Show the best available server
    Best,

    /// Connect, generate traffic, then disconnect
    Connect {
        /// Server id (default: best available)
        #[arg(long)]
        server: Option<String>,

        /// How long to stay connected
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },

    /// Print the default configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => VeilConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => VeilConfig::default(),
    };

    match cli.command {
        Commands::Servers => list_servers(&config.build_catalog()),
        Commands::Best => show_best(&config.build_catalog()),
        Commands::Connect { server, seconds } => run_session(&config, server, seconds).await?,
        Commands::Config => print!("{}", VeilConfig::default().to_toml()?),
    }

    Ok(())
}

fn list_servers(catalog: &ServerCatalog) {
    println!(
        "{:<8} {:<28} {:<12} {:>5} {:>7} {:>5}  {}",
        "ID", "NAME", "PROTOCOL", "SCORE", "PING", "LOAD", "STATUS"
    );
    for server in catalog.snapshot().iter() {
        println!(
            "{:<8} {:<28} {:<12} {:>5} {:>5}ms {:>4}%  {}",
            server.id,
            server.descriptor(),
            server.protocol.name(),
            server.performance_score,
            server.ping_ms,
            server.load_percent,
            if server.is_available { "up" } else { "down" },
        );
    }

    let quick: Vec<String> = catalog
        .quick_connect_default()
        .into_iter()
        .map(|s| format!("{} ({}ms)", s.id, s.ping_ms))
        .collect();
    println!();
    println!("Quick connect: {}", quick.join(", "));
}

fn show_best(catalog: &ServerCatalog) {
    match catalog.select_best_server() {
        Some(server) => println!(
            "{} {} (score {}, ping {}ms, {})",
            server.id,
            server.descriptor(),
            server.performance_score,
            server.ping_ms,
            server.endpoint()
        ),
        None => println!("No available servers"),
    }
}

async fn run_session(config: &VeilConfig, server_id: Option<String>, seconds: u64) -> Result<()> {
    let catalog = Arc::new(config.build_catalog());
    let server = match server_id {
        Some(id) => Some(
            catalog
                .find(&id)
                .with_context(|| format!("unknown server id: {}", id))?,
        ),
        None => None,
    };

    let manager = ConnectionSessionManager::new(
        catalog,
        Arc::new(config.build_simulated_transport()),
        config.build_resilience(Arc::new(AlwaysReachable)),
    );

    let mut status = manager.subscribe_status();
    let watcher = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            info!("Status: {}", *status.borrow_and_update());
        }
    });

    manager
        .connect_with_retry(server)
        .await
        .context("connecting")?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    for tick in 1..=seconds {
        ticker.tick().await;
        // Synthetic load: 16 KiB up, 64 KiB down per second
        manager.update_traffic(16 * 1024, 64 * 1024 + tick * 512);
        println!("{}", manager.connection_summary());
    }

    let summary = manager.connection_summary();
    manager.disconnect().await.context("disconnecting")?;

    println!(
        "Session over: {} sent, {} received in {}s",
        format_bytes(summary.bytes_sent),
        format_bytes(summary.bytes_received),
        summary.elapsed_seconds
    );

    drop(manager);
    watcher.await.ok();
    Ok(())
}
