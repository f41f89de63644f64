//! Relay server for triggering preview cron endpoints.
//!
//! Serves `POST /api/trigger-cron` (configurable) for callers that cannot
//! reach a preview deployment themselves.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use preview_cron::config::{load_config, validation::validate_config, ConfigError, RelayConfig};
use preview_cron::http::HttpServer;
use preview_cron::lifecycle::{signals, Shutdown};
use preview_cron::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "preview-cron")]
#[command(about = "Relay server for triggering preview cron jobs", long_about = None)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        path = %config.relay.path,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();
    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move { signals::trigger_on_signal(&shutdown).await }
    });

    HttpServer::new(config)?.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
