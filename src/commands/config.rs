use anyhow::Result;
use colored::Colorize;
use tracing::info;
use usage_tracker::config::Config;

/// Execute the config show command
///
/// Prints the effective configuration (defaults, file and environment merged)
pub fn show(cfg: &Config) -> Result<()> {
    info!("Displaying effective configuration");

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(cfg)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(cfg: &Config) -> Result<()> {
    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Data File: {}", cfg.storage.data_file.display());
    println!("  Metrics: {}", if cfg.metrics.enabled { "enabled" } else { "disabled" });

    info!("Configuration validation successful");
    Ok(())
}
