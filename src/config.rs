use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::UsageDocument;
use crate::scan::ScanLimits;

/// Environment variable prefix, e.g. `USAGE_TRACKER__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "USAGE_TRACKER";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub log_scan: LogScanConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// "text" or "json"
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Usage document location
    pub data_file: PathBuf,
    /// Dashboard assets served for non-API paths
    pub public_dir: PathBuf,
}

/// Limits seeded into a freshly created usage document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    pub monthly: i64,
    pub weekly: i64,
    pub session: i64,
    pub reset_day: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogScanConfig {
    /// Leading `~` expands to the home directory
    pub dir: String,
    pub max_files: usize,
    pub max_samples: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl LimitsConfig {
    pub fn default_document(&self) -> UsageDocument {
        UsageDocument::with_limits(self.monthly, self.weekly, self.session, self.reset_day)
    }
}

impl LogScanConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        expand_home(&self.dir)
    }

    pub fn limits(&self) -> ScanLimits {
        ScanLimits {
            max_files: self.max_files,
            max_samples: self.max_samples,
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
            home.join(&rest[1..])
        }
        _ => PathBuf::from(path),
    }
}

/// Load configuration: built-in defaults, then the optional TOML file, then
/// `USAGE_TRACKER__*` environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let defaults = config::Config::try_from(&Config::default())?;

    let config = config::Config::builder()
        .add_source(defaults)
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8889,
                log_level: "info".to_string(),
                log_format: "text".to_string(),
            },
            storage: StorageConfig {
                data_file: PathBuf::from("usage.json"),
                public_dir: PathBuf::from("public"),
            },
            limits: LimitsConfig {
                monthly: crate::models::usage::DEFAULT_MONTHLY_LIMIT,
                weekly: crate::models::usage::DEFAULT_WEEKLY_LIMIT,
                session: crate::models::usage::DEFAULT_SESSION_LIMIT,
                reset_day: crate::models::usage::DEFAULT_RESET_DAY,
            },
            log_scan: LogScanConfig {
                dir: "~/.claude/logs".to_string(),
                max_files: 20,
                max_samples: 5,
            },
            metrics: MetricsConfig {
                enabled: true,
                endpoint: "/metrics".to_string(),
            },
        }
    }
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        anyhow::bail!("Server port must be non-zero");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid log format '{}': expected 'text' or 'json'", other),
    }

    if !(1..=31).contains(&cfg.limits.reset_day) {
        anyhow::bail!("Reset day must be between 1 and 31, got {}", cfg.limits.reset_day);
    }

    if cfg.limits.monthly < 0 || cfg.limits.weekly < 0 || cfg.limits.session < 0 {
        anyhow::bail!("Token limits cannot be negative");
    }

    if cfg.log_scan.max_files == 0 || cfg.log_scan.max_samples == 0 {
        anyhow::bail!("Log scan max_files and max_samples must be greater than zero");
    }

    if cfg.metrics.enabled {
        let endpoint = cfg.metrics.endpoint.as_str();
        if !endpoint.starts_with('/') {
            anyhow::bail!("Metrics endpoint must start with '/': {}", endpoint);
        }
        if endpoint.starts_with("/api/") || endpoint == "/api" || endpoint == "/v1/logs" {
            anyhow::bail!("Metrics endpoint '{}' collides with the tracker API", endpoint);
        }
    }

    Ok(())
}
