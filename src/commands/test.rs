use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tracing::info;
use usage_tracker::config::Config;

/// Execute the test command
///
/// Configuration has already been loaded and validated; print what it
/// resolved to.
pub fn execute(config_path: &Path, cfg: &Config) -> Result<()> {
    info!("Configuration loaded and validated");

    println!("{}", "✓ Configuration test successful".green());
    if !config_path.exists() {
        println!(
            "  {}",
            format!("{} not found, using defaults", config_path.display()).yellow()
        );
    }
    println!();

    println!("{}", "Configuration Summary:".bold());
    println!("  {}: {}:{}", "Server".cyan(), cfg.server.host, cfg.server.port);
    println!("  {}: {}", "Log Level".cyan(), cfg.server.log_level);
    println!("  {}: {}", "Log Format".cyan(), cfg.server.log_format);
    println!();

    let data_status = if cfg.storage.data_file.exists() {
        "exists".green()
    } else {
        "will be created".yellow()
    };
    println!(
        "  {}: {} ({})",
        "Data File".cyan(),
        cfg.storage.data_file.display(),
        data_status
    );
    println!("  {}: {}", "Public Dir".cyan(), cfg.storage.public_dir.display());
    println!();

    println!("  {}:", "Limits".cyan());
    println!("    monthly: {}", cfg.limits.monthly);
    println!("    weekly: {}", cfg.limits.weekly);
    println!("    session: {}", cfg.limits.session);
    println!("    reset day: {}", cfg.limits.reset_day);
    println!();

    let log_dir = cfg.log_scan.resolved_dir();
    let log_status = if log_dir.is_dir() {
        "found".green()
    } else {
        "missing".red()
    };
    println!("  {}: {} ({})", "Log Dir".cyan(), log_dir.display(), log_status);

    let metrics_status = if cfg.metrics.enabled {
        cfg.metrics.endpoint.as_str().green()
    } else {
        "disabled".red()
    };
    println!("  {}: {}", "Metrics".cyan(), metrics_status);

    Ok(())
}
