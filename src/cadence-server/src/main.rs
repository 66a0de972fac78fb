//! Cadence — multi-tenant drip-campaign engine.
//!
//! Main entry point that initializes the store and engine components and
//! starts the HTTP server.

use cadence_api::ApiServer;
use cadence_core::activity;
use cadence_core::config::AppConfig;
use cadence_engine::SequenceStore;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cadence-server")]
#[command(about = "Multi-tenant drip-campaign engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CADENCE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CADENCE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seed a demo tenant with sample leads on startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Cadence starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        "Configuration loaded"
    );

    let store = Arc::new(SequenceStore::new());

    if cli.seed_demo {
        let tenant_id = store.seed_demo_data();
        info!(tenant_id = %tenant_id, "Demo data seeded");
    }

    // The surrounding CRM supplies the real activity timeline; standalone
    // runs log through a no-op sink.
    let api_server = ApiServer::new(config, store, activity::noop_sink());

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Cadence is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
