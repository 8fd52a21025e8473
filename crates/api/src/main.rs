//! Driver Drowsiness Monitor - Main Entry Point

use api::config::DEFAULT_CONFIG_PATH;
use api::{init_logging, run_server, AppConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "drowsiness-monitor", version, about = "Driver drowsiness detection service")]
struct Cli {
    /// Application settings file
    #[arg(long, env = "DROWSY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    let config = AppConfig::load(&cli.config)?;
    run_server(config).await?;

    Ok(())
}
