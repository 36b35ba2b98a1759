use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{CacheStrategy, CacheVersion};
use crate::worker::{RetryPolicy, WorkerConfig};

/// Environment variable overriding `api.url`.
pub const API_URL_ENV: &str = "TIMECACHE_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub worker: WorkerSection,
  pub sync: SyncConfig,
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Backend API base, e.g. `http://localhost:5000/api`
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:5000/api".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
  /// Origin the front end is served from
  pub origin: String,
  /// Cache version; bump it to invalidate everything cached before
  pub version: String,
  pub strategy: CacheStrategy,
  /// Assets cached on install. Relative entries resolve against `origin`.
  pub manifest: Vec<String>,
}

impl Default for WorkerSection {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5000".to_string(),
      version: "time-tracker-v2.0.0".to_string(),
      strategy: CacheStrategy::default(),
      manifest: default_manifest(),
    }
  }
}

fn default_manifest() -> Vec<String> {
  [
    "/",
    "/static/manifest.json",
    "/add_order",
    "/reports",
    "/upload_image",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
    "https://cdn.jsdelivr.net/npm/chart.js",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
  pub jitter: bool,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_ms: 500,
      max_delay_ms: 10_000,
      jitter: true,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// SQLite database file (defaults to the data directory)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./timecache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/timecache/config.yaml
  ///
  /// Built-in defaults apply when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api.url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("timecache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("timecache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// The worker's view of this configuration.
  pub fn worker_config(&self) -> Result<WorkerConfig> {
    let origin = Url::parse(&self.worker.origin)
      .map_err(|e| eyre!("Invalid worker origin '{}': {}", self.worker.origin, e))?;

    let config = WorkerConfig {
      version: CacheVersion::new(self.worker.version.clone()),
      origin,
      manifest: self.worker.manifest.clone(),
      strategy: self.worker.strategy,
    };
    // Surface bad manifest entries at startup rather than on install
    config.manifest_urls()?;

    Ok(config)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.sync.max_attempts,
      base_delay: Duration::from_millis(self.sync.base_delay_ms),
      max_delay: Duration::from_millis(self.sync.max_delay_ms),
      jitter: self.sync.jitter,
    }
  }

  pub fn api_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  /// Directory for the cache database and log files.
  pub fn data_dir() -> PathBuf {
    dirs::data_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("timecache")
  }

  pub fn cache_path(&self) -> PathBuf {
    self
      .cache
      .path
      .clone()
      .unwrap_or_else(|| Self::data_dir().join("cache.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_deployment() {
    let config = Config::default();
    let worker = config.worker_config().unwrap();

    assert_eq!(worker.version.as_str(), "time-tracker-v2.0.0");
    assert_eq!(worker.manifest.len(), 9);
    assert_eq!(worker.manifest[0], "/");
    assert_eq!(worker.strategy, CacheStrategy::CacheFirst);
    assert_eq!(config.api.url, "http://localhost:5000/api");
    assert_eq!(config.retry_policy(), RetryPolicy::default());
  }

  #[test]
  fn test_partial_file_keeps_other_defaults() {
    let config = Config::parse(
      r#"
worker:
  version: time-tracker-v3.0.0
  strategy: network-first
  manifest: ["/", "/reports"]
sync:
  max_attempts: 5
"#,
    )
    .unwrap();

    assert_eq!(config.worker.version, "time-tracker-v3.0.0");
    assert_eq!(config.worker.strategy, CacheStrategy::NetworkFirst);
    assert_eq!(config.worker.manifest, vec!["/", "/reports"]);
    assert_eq!(config.worker.origin, "http://localhost:5000");
    assert_eq!(config.sync.max_attempts, 5);
    assert_eq!(config.sync.base_delay_ms, 500);
    assert_eq!(config.api.timeout_secs, 30);
  }

  #[test]
  fn test_load_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "cache:\n  path: /tmp/tc.db\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.cache_path(), PathBuf::from("/tmp/tc.db"));
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/timecache.yaml"))).is_err());
  }

  #[test]
  fn test_invalid_origin_is_error() {
    let mut config = Config::default();
    config.worker.origin = "not a url".to_string();

    assert!(config.worker_config().is_err());
  }

  #[test]
  fn test_unknown_strategy_is_error() {
    assert!(Config::parse("worker:\n  strategy: stale-while-revalidate\n").is_err());
  }
}
