//! Tollgate gateway binary.
//!
//! Loads the YAML configuration named by `--config` (or `TOLLGATE_CONFIG`),
//! applies command-line overrides, starts the three listeners and runs
//! until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tollgate_gateway::{telemetry, ConfigOverrides, ConfigStore, GatewayServer, GatewayState, LogFormat};

/// API gateway with weighted routing, rate limiting and circuit breaking.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// Configuration file (YAML). Defaults apply when omitted.
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Application listen address.
    #[arg(long, env = "TOLLGATE_HTTP_ADDR")]
    http_addr: Option<String>,

    /// WebSocket listen address.
    #[arg(long, env = "TOLLGATE_WS_ADDR")]
    ws_addr: Option<String>,

    /// Admin listen address.
    #[arg(long, env = "TOLLGATE_ADMIN_ADDR")]
    admin_addr: Option<String>,

    /// Enable debug endpoints.
    #[arg(long)]
    debug: bool,

    /// Log filter, e.g. "info" or "info,tollgate_gateway=debug".
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: text, compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            http_addr: self.http_addr.clone(),
            ws_addr: self.ws_addr.clone(),
            admin_addr: self.admin_addr.clone(),
            debug: self.debug,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let store = ConfigStore::load(args.config.clone(), args.overrides())?;
    let config = store.current();
    telemetry::init(&config.log)?;

    tracing::info!(
        config = ?store.path(),
        http_addr = %config.server.http_addr,
        ws_addr = %config.server.ws_addr,
        admin_addr = %config.server.admin_addr,
        debug = config.server.debug,
        "Starting tollgate"
    );

    let state = GatewayState::new(Arc::new(store))?;
    state.hub.register_examples().await?;

    let server = GatewayServer::new(state);
    server.start().await?;

    shutdown_signal().await;
    server.stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
