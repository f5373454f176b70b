use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parley_server::{ChatHub, ServerConfig, ShutdownCoordinator};
use parley_telemetry::TelemetryConfig;

/// Real-time group chat over WebSockets.
#[derive(Parser, Debug)]
#[command(name = "parley", version)]
struct Cli {
    /// Settings file (defaults to `$PARLEY_CONFIG` or `./parley.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port, overriding settings and environment.
    #[arg(long)]
    port: Option<u16>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(parley_settings::settings_path);
    let mut settings = parley_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.log_json {
        settings.logging.json = true;
    }

    let telemetry = TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(module, level)| (module.as_str(), level.as_str())),
        settings.logging.json,
    )?;
    parley_telemetry::init_telemetry(&telemetry)?;

    tracing::info!(settings = %path.display(), "starting parley");

    let hub = Arc::new(ChatHub::new());
    let coordinator = ShutdownCoordinator::new();
    let handle = parley_server::start(
        ServerConfig::from_settings(&settings.server),
        Arc::clone(&hub),
        coordinator.token(),
    )
    .await
    .with_context(|| {
        format!(
            "failed to bind {}:{}",
            settings.server.host, settings.server.port
        )
    })?;

    tracing::info!(addr = %handle.addr, "parley ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!(connections = hub.connection_count(), "shutting down");
    let drained = coordinator
        .graceful_shutdown(
            vec![handle.into_task()],
            Some(settings.server.shutdown_timeout()),
        )
        .await;
    if !drained {
        tracing::warn!("some connections did not close in time");
    }
    Ok(())
}
