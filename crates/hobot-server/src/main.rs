//! Gateway binary entrypoint.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use hobot_server::{AppState, serve};
use hobot_settings::load_settings;

#[derive(Debug, Parser)]
#[command(name = "hobot-gateway", version, about = "Clinical AI gateway")]
struct Args {
    /// Path to the settings file. Defaults and HOBOT_* env overrides apply
    /// on top.
    #[arg(long, env = "HOBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port from settings.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref()).context("loading settings")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let state = AppState::bootstrap(&settings, Some(metrics)).context("bootstrapping gateway")?;
    serve(state, &settings.server.bind, settings.server.port)
        .await
        .context("serving")?;
    Ok(())
}
