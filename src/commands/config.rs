use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;
use telemetry_hub::config::{self, Config};
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration (file, env overrides and defaults)
pub fn show(path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!(path = %path.display(), "Loading configuration for display");

    let cfg = config::load_config(path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&cfg)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
///
/// Unlike `show`, a missing file is an error here.
pub fn validate(path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!(path = %path.display(), "Validating configuration file");

    if !path.exists() {
        bail!("Configuration file not found: {}", path.display());
    }

    let cfg = config::load_config(path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    for line in summary_lines(&cfg) {
        println!("  {}", line);
    }

    Ok(())
}

fn summary_lines(cfg: &Config) -> Vec<String> {
    vec![
        format!("Listen: {}:{}", cfg.server.host, cfg.server.port),
        format!(
            "Capacity: {} spans, {} logs, {} metrics",
            cfg.storage.trace_capacity, cfg.storage.log_capacity, cfg.storage.metric_capacity
        ),
        format!(
            "Query limit: {} (max {})",
            cfg.storage.default_query_limit, cfg.storage.max_query_limit
        ),
        format!(
            "Metrics: {}",
            if cfg.metrics.enabled {
                cfg.metrics.endpoint.as_str()
            } else {
                "disabled"
            }
        ),
    ]
}
