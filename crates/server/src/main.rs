//! Harvest server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use harvest_core::config::AppConfig;
use harvest_server::{AppState, ResumptionTokenStore, create_router};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Harvest - An OAI-PMH metadata repository server
#[derive(Parser, Debug)]
#[command(name = "harvestd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "HARVEST_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Harvest v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    harvest_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = harvest_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), metadata);

    if let Some(interval) = state.token_prune_interval() {
        let tokens = ResumptionTokenStore::new(
            state.metadata.clone(),
            config.repository.token_ttl(),
        );
        spawn_token_prune_task(tokens, interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Resumption token prune task spawned"
        );
    } else {
        tracing::info!("Background token pruning disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load configuration from the optional file, overridden by `HARVEST_` variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    // HARVEST_CONFIG only names the file
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("HARVEST_") && key != "HARVEST_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: harvestd --config /path/to/config.toml\n  \
             2. Environment variables: HARVEST_SERVER__BIND=0.0.0.0:8080 \
             HARVEST_REPOSITORY__NAME=\"My Repository\" harvestd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set HARVEST_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    figment
        .merge(Env::prefixed("HARVEST_").split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Periodically delete expired resumption tokens.
fn spawn_token_prune_task(tokens: ResumptionTokenStore, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match tokens.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(removed, "Pruned expired resumption tokens");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to prune expired resumption tokens");
                }
            }
        }
    });
}
