//! Edge gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────────┐
//!                      │                       EDGE GATEWAY                        │
//!                      │                                                           │
//!  Client Request      │  ┌───────────┐   ┌─────────┐   ┌──────┐   ┌────────────┐  │
//!  ────────────────────┼─▶│rate limit │──▶│ tracing │──▶│ auth │──▶│ permission │  │
//!                      │  │ (429)     │   │         │   │(401) │   │   (403)    │  │
//!                      │  └───────────┘   └─────────┘   └──────┘   └─────┬──────┘  │
//!                      │                                                 │         │
//!                      │                                                 ▼         │
//!  Client Response     │                                          ┌────────────┐   │
//!  ◀───────────────────┼──────────────────────────────────────────│ forwarder  │◀──┼──── Upstream
//!                      │                                          └────────────┘   │
//!                      └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{load_config, validate_config, ConfigError, GatewayConfig};
use edge_gateway::http::HttpServer;
use edge_gateway::lifecycle::{build_pipeline, signals, Shutdown, StartupError};
use edge_gateway::observability::{logging, metrics, TelemetryObserver};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Edge gateway: trace propagation, token verification, menu permissions", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = GatewayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init_logging(&config.observability)
        .map_err(|e| StartupError::Logging(e.to_string()))?;

    tracing::info!("edge-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pipeline = build_pipeline(&config, Arc::new(TelemetryObserver))?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config, pipeline);
    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
