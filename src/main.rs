use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

mod cli;
mod commands;

use usage_tracker::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Version => {
            println!("Usage Tracker v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => run(command, &args.config).await,
    }
}

/// Load configuration, initialize tracing and dispatch
async fn run(command: cli::Commands, config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path).with_context(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;

    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    match command {
        cli::Commands::Start => commands::start::execute(cfg).await,
        cli::Commands::Test => commands::test::execute(config_path, &cfg),
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg),
            cli::ConfigCommands::Validate => commands::config::validate(&cfg),
        },
        cli::Commands::Scan => commands::scan::execute(&cfg).await,
        cli::Commands::Version => Ok(()),
    }
}
