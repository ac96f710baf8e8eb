//! productionapp control service binary.
//!
//! Serves the deployment API on top of the configured automation engine.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use productionapp_control::{ControlConfig, ControlService};

#[derive(Parser)]
#[command(name = "productionapp-control")]
#[command(about = "Create, list and delete productionapp deployments")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to productionapp.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("productionapp_control=info".parse()?),
        )
        .init();

    info!("productionapp control service starting");

    let loaded = match &cli.config {
        Some(path) => ControlConfig::from_file(path),
        None => ControlConfig::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ControlConfig::default()
    });

    info!(
        listen = %config.server.listen,
        project = %config.project.name,
        engine_type = ?config.engine.engine_type,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;

    Ok(())
}
