//! HTTP traffic splitter.
//!
//! Every inbound request is replayed to each configured upstream. The first
//! upstream (the primary) answers the client; the others (shadows) receive
//! the same traffic and have their responses drained and recorded.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                   SPLITTER                    │
//!   Client Request    │  ┌────────┐    ┌────────────┐                 │
//!   ──────────────────┼─▶│  http  │───▶│   split    │──┬─▶ upstream 0 ─┼──▶ Primary
//!                     │  │ server │    │ dispatcher │  ├─▶ upstream 1 ─┼──▶ Shadow
//!   Client Response   │  │        │◀───│  (relay)   │  └─▶ upstream n ─┼──▶ Shadow
//!   ◀─────────────────┼──└────────┘    └─────┬──────┘                 │
//!                     │                      ▼                        │
//!                     │                ┌───────────┐    ┌─────────┐   │
//!                     │                │ event bus │───▶│  admin  │◀──┼── Operator
//!                     │                └───────────┘    └─────────┘   │
//!                     │  config · lifecycle · observability           │
//!                     └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use splitter::config::{load_config, watcher::ConfigWatcher};
use splitter::lifecycle::{signals::wait_for_shutdown_signal, shutdown::signalled};
use splitter::observability::{logging, metrics};
use splitter::{Shutdown, SplitterServer};

#[derive(Parser)]
#[command(name = "splitter")]
#[command(about = "Mirror HTTP traffic to shadow upstreams while serving from a primary", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let Some(config_path) = args.config else {
        println!("No config loaded");
        return Ok(());
    };

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "splitter starting");

    tracing::info!(
        config = %config_path.display(),
        bind_address = %config.listener.bind_address(),
        upstreams = config.upstreams.len(),
        rewrite_host = config.rewrite_host,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = SplitterServer::new(config.clone())?;

    let admin_task = if config.admin.enabled {
        let admin_listener = TcpListener::bind(config.admin.bind_address()).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin surface listening");
        let router = server.admin_router();
        let admin_shutdown = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, router)
                .with_graceful_shutdown(signalled(admin_shutdown))
                .await
            {
                tracing::error!(error = %e, "Admin server failed");
            }
        }))
    } else {
        None
    };

    let (watcher, config_updates) = ConfigWatcher::new(&config_path);
    // Dropping the handle stops the watch.
    let _watch = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        trigger.trigger();
    });

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    if let Some(admin_task) = admin_task {
        let _ = admin_task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
