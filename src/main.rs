use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use surface_adapter::ChromiumLauncher;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use viabot::config::AppConfig;
use viabot::server::notify::Notifier;
use viabot::server::{self, AppState};
use viabot::upload::S3ArtifactStore;
use workflow_engine::WorkflowEngine;

#[derive(Debug, Parser)]
#[command(name = "viabot", about = "Unattended viability-request workflow engine")]
struct Cli {
    /// Listen port; overrides the configured value.
    #[arg(long)]
    port: Option<u16>,

    /// Emit JSON log lines instead of the human-readable format.
    #[arg(long)]
    json_logs: bool,

    /// Load and validate the configuration, then exit.
    #[arg(long)]
    check_config: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    if cli.check_config {
        info!("configuration is valid");
        return Ok(());
    }

    let artifacts = Arc::new(
        S3ArtifactStore::new(config.storage.bucket.clone(), config.storage.region.clone()).await,
    );
    if !artifacts.is_configured() {
        warn!("artifact storage not configured, reports will not be persisted");
    }

    let engine = Arc::new(WorkflowEngine::new(
        Arc::new(ChromiumLauncher),
        artifacts,
        config.engine_settings(),
    ));
    let notifier = Arc::new(Notifier::new(
        config.records_api.base_url.clone(),
        config.records_api.api_secret.clone(),
    ));
    let state = Arc::new(AppState::new(engine, notifier));

    let port = cli.port.unwrap_or(config.server.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "viability webhook listening");
    axum::serve(listener, server::router(state))
        .await
        .context("serving the webhook")?;
    Ok(())
}
