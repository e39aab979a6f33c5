use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use telemetry_hub::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Serve configures logging from the loaded config
    match args.get_command() {
        cli::Commands::Serve => {
            commands::serve::execute(&args.config).await?;
        }
        cli::Commands::Config { action } => {
            init_tracing("warn", "text");
            match action {
                cli::ConfigCommands::Show => commands::config::show(&args.config)?,
                cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
            }
        }
        cli::Commands::Version => {
            println!("Telemetry Hub v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
