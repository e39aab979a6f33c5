use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use telemetry_hub::{config, init_tracing, server};
use tracing::info;

/// Execute the serve command
///
/// Loads configuration, initializes logging from it and runs the server
/// until a shutdown signal arrives.
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    println!("{}", "Starting telemetry hub...".green());
    info!(
        config = %config_path.display(),
        "Starting telemetry hub v{}",
        env!("CARGO_PKG_VERSION")
    );

    server::start_server(cfg).await
}
