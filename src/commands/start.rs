use anyhow::Result;
use colored::Colorize;
use tracing::info;
use usage_tracker::{config::Config, server};

/// Execute the start command
///
/// Runs in the foreground until SIGTERM/SIGINT.
pub async fn execute(cfg: Config) -> Result<()> {
    println!("{}", "Starting usage tracker...".green());
    info!(
        "Starting usage tracker on {}:{}",
        cfg.server.host, cfg.server.port
    );

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
