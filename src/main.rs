//! flaky-registry
//!
//! An artifact registry front that fails on purpose.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                   FLAKY REGISTRY                      │
//!                     │                                                       │
//!   Client Request    │  ┌──────────┐   ┌───────────┐   ┌────────────────┐   │
//!   ──────────────────┼─▶│ request  │──▶│  request  │──▶│ fault injector │   │
//!                     │  │ id/trace │   │  counter  │   │  n % 50 == 0 ? │   │
//!                     │  └──────────┘   └───────────┘   └───┬────────┬───┘   │
//!                     │                                     │ no     │ yes   │
//!                     │                                     ▼        ▼       │
//!                     │                          ┌──────────────┐ ┌───────┐  │
//!   Client Response   │                          │   upstream   │ │  500  │  │
//!   ◀─────────────────┼──────────────────────────│ memory/proxy │ │       │  │
//!                     │                          └──────────────┘ └───────┘  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use flaky_registry::config::{load_config, validate_config, ConfigError, FlakyConfig, UpstreamMode};
use flaky_registry::disruption::{DISRUPTION_INTERVAL, RESET_THRESHOLD};
use flaky_registry::http::{bind_listener, HttpServer};
use flaky_registry::lifecycle::{shutdown_signal, Shutdown};
use flaky_registry::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "flaky-registry")]
#[command(about = "Artifact registry that fails every 50th request", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration.
    #[arg(short, long)]
    bind: Option<String>,

    /// Forward to this backend (host:port) instead of the in-memory registry.
    #[arg(short, long)]
    upstream: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<FlakyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => FlakyConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(address) = self.upstream {
            config.upstream.mode = UpstreamMode::Proxy;
            config.upstream.address = address;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!("flaky-registry v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = ?config.upstream.mode,
        reset_threshold = RESET_THRESHOLD,
        disruption_interval = DISRUPTION_INTERVAL,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = bind_listener(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
