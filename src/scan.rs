//! Best-effort diagnostic scan of local agent logs for token-usage entries.
//!
//! Never authoritative and never mutates the usage document. Unreadable files
//! and unparseable lines are dropped silently.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

/// Top-level keys that mark a log entry as usage-bearing
const USAGE_KEYS: [&str; 3] = ["usage", "tokens", "input_tokens"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Most-recently-modified files to read
    pub max_files: usize,
    /// Matches returned as samples
    pub max_samples: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_files: 20,
            max_samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSample {
    pub file: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanReport {
    Found {
        found: usize,
        samples: Vec<LogSample>,
        log_dir: String,
    },
    Missing {
        error: String,
        path: String,
    },
}

/// Scan `dir` for usage entries
pub fn scan_logs(dir: &Path, limits: ScanLimits) -> ScanReport {
    if !dir.is_dir() {
        return ScanReport::Missing {
            error: "No Claude logs directory found".to_string(),
            path: dir.display().to_string(),
        };
    }

    let mut found = 0;
    let mut samples = Vec::new();

    let scanned = candidate_files(dir)
        .into_iter()
        .take(limits.max_files)
        .filter_map(|path| match scan_file(&path) {
            Ok(entries) => Some((path, entries)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable log file");
                None
            }
        });

    for (path, entries) in scanned {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for data in entries {
            found += 1;
            if samples.len() < limits.max_samples {
                samples.push(LogSample {
                    file: file.clone(),
                    data,
                });
            }
        }
    }

    ScanReport::Found {
        found,
        samples,
        log_dir: dir.display().to_string(),
    }
}

/// `*.json` directly in `dir` plus `*.jsonl` at any depth, newest first
fn candidate_files(dir: &Path) -> Vec<PathBuf> {
    let json_files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "json"));

    let jsonl_files = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), "jsonl"));

    let mut files: Vec<(SystemTime, PathBuf)> = json_files
        .chain(jsonl_files)
        .map(|e| {
            let modified = e
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.into_path())
        })
        .collect();

    files.sort_by(|a, b| b.0.cmp(&a.0));
    files.into_iter().map(|(_, path)| path).collect()
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

/// Usage-bearing entries of one file, one JSON document per line
fn scan_file(path: &Path) -> std::io::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(is_usage_entry)
        .collect())
}

fn is_usage_entry(entry: &Value) -> bool {
    entry
        .as_object()
        .is_some_and(|obj| USAGE_KEYS.iter().any(|key| obj.contains_key(*key)))
}
