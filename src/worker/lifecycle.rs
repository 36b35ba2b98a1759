//! Install and activation of a cache version.

use color_eyre::{eyre::eyre, Report, Result};
use futures::future::try_join_all;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheStorage, CacheStrategy, CacheVersion, RequestKey};
use crate::net::{Network, Request};

/// Everything the worker needs to know about the deployment it serves.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Current cache version
  pub version: CacheVersion,
  /// Trust origin: relative manifest entries resolve against it and only
  /// responses from it are cached at runtime
  pub origin: Url,
  /// Assets seeded into the cache on install, in order
  pub manifest: Vec<String>,
  pub strategy: CacheStrategy,
}

impl WorkerConfig {
  /// Resolve the manifest into absolute URLs.
  pub fn manifest_urls(&self) -> Result<Vec<Url>> {
    self
      .manifest
      .iter()
      .map(|asset| {
        self
          .origin
          .join(asset)
          .map_err(|e| eyre!("Invalid manifest entry '{}': {}", asset, e))
      })
      .collect()
  }
}

/// Lifecycle of one cache version.
///
/// There is no failed state: an install that fails goes back to
/// `Uninstalled` and the previous version keeps serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Uninstalled,
  Installing,
  /// Installed, waiting for activation
  Installed,
  Active,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Uninstalled => "uninstalled",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Active => "active",
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WorkerState {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "uninstalled" => Ok(Self::Uninstalled),
      "installing" => Ok(Self::Installing),
      "installed" => Ok(Self::Installed),
      "active" => Ok(Self::Active),
      other => Err(eyre!("Unknown worker state '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub version: CacheVersion,
  /// Number of assets written to the store
  pub cached: usize,
  /// The version was already installed; nothing was fetched
  pub already_installed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Stale stores that were removed
  pub deleted: Vec<String>,
  /// Stale stores that could not be removed, with the reason
  pub failed: Vec<(String, String)>,
  /// The version was already active; nothing was cleaned up
  pub already_active: bool,
}

/// Seeds the cache on install and rotates old versions out on activation.
pub struct LifecycleManager<S: CacheStorage> {
  config: Arc<WorkerConfig>,
  storage: Arc<S>,
  network: Arc<dyn Network>,
  state: RwLock<WorkerState>,
}

impl<S: CacheStorage> LifecycleManager<S> {
  /// Create a manager, restoring the persisted state of the configured
  /// version. An install that was interrupted counts as not installed.
  pub fn new(config: Arc<WorkerConfig>, storage: Arc<S>, network: Arc<dyn Network>) -> Result<Self> {
    let state = match storage.load_state(config.version.as_str())? {
      Some(WorkerState::Installing) | None => WorkerState::Uninstalled,
      Some(state) => state,
    };

    Ok(Self {
      config,
      storage,
      network,
      state: RwLock::new(state),
    })
  }

  pub fn state(&self) -> WorkerState {
    *self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_active(&self) -> bool {
    self.state() == WorkerState::Active
  }

  pub fn version(&self) -> &CacheVersion {
    &self.config.version
  }

  /// The version whose store answers requests.
  ///
  /// This version once it is active. Until then, the version that was
  /// activated last keeps serving, so a failed or pending upgrade leaves
  /// the previous cache in charge. `None` when nothing has been activated.
  pub fn serving_version(&self) -> Result<Option<CacheVersion>> {
    if self.is_active() {
      return Ok(Some(self.config.version.clone()));
    }
    Ok(self.storage.active_version()?.map(CacheVersion::new))
  }

  fn set_state(&self, state: WorkerState) -> Result<()> {
    *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    self.storage.save_state(self.config.version.as_str(), state)
  }

  /// Fetch every manifest asset and store them under the current version.
  ///
  /// All or nothing: if any asset fails to download (or comes back with a
  /// non-2xx status) nothing is written and the state returns to
  /// `Uninstalled`.
  pub async fn install(&self) -> Result<InstallReport> {
    let version = self.config.version.clone();

    match self.state() {
      WorkerState::Installed | WorkerState::Active => {
        info!(%version, "already installed");
        return Ok(InstallReport {
          version,
          cached: 0,
          already_installed: true,
        });
      }
      WorkerState::Installing => {
        return Err(eyre!("Install of {} is already in progress", version));
      }
      WorkerState::Uninstalled => {}
    }

    info!(%version, assets = self.config.manifest.len(), "installing");
    self.set_state(WorkerState::Installing)?;

    match self.seed().await {
      Ok(cached) => {
        self.set_state(WorkerState::Installed)?;
        info!(%version, cached, "installed");
        Ok(InstallReport {
          version,
          cached,
          already_installed: false,
        })
      }
      Err(e) => {
        error!(%version, error = %e, "install failed");
        self.set_state(WorkerState::Uninstalled)?;
        Err(e.wrap_err(format!("Install of {} failed", version)))
      }
    }
  }

  async fn seed(&self) -> Result<usize> {
    let urls = self.config.manifest_urls()?;

    let fetches = urls.iter().map(|url| async move {
      let response = self
        .network
        .fetch(&Request::get(url.clone()))
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

      if !response.ok() {
        return Err(eyre!("Failed to fetch {}: status {}", url, response.status));
      }

      Ok::<_, Report>((RequestKey::get(url), response))
    });

    let entries = try_join_all(fetches).await?;
    self
      .storage
      .put_all(self.config.version.as_str(), &entries)?;

    Ok(entries.len())
  }

  /// Delete every cache store that does not belong to the current version.
  ///
  /// Deletions are independent: one failing is recorded and the rest still
  /// run. Activating an active version is a no-op.
  pub fn activate(&self) -> Result<ActivationReport> {
    let version = self.config.version.clone();

    match self.state() {
      WorkerState::Active => {
        info!(%version, "already active");
        return Ok(ActivationReport {
          already_active: true,
          ..Default::default()
        });
      }
      WorkerState::Installed => {}
      state => {
        return Err(eyre!("Cannot activate {}: worker is {}", version, state));
      }
    }

    info!(%version, "activating");
    let mut report = ActivationReport::default();

    for name in self.storage.store_names()? {
      if name == version.as_str() {
        continue;
      }

      match self.storage.delete_store(&name) {
        Ok(_) => {
          info!(store = %name, "deleted old cache");
          report.deleted.push(name);
        }
        Err(e) => {
          warn!(store = %name, error = %e, "failed to delete old cache");
          report.failed.push((name, e.to_string()));
        }
      }
    }

    self.set_state(WorkerState::Active)?;
    info!(%version, "active");

    Ok(report)
  }

  /// Names of all cache stores currently present.
  pub fn list_versions(&self) -> Result<Vec<String>> {
    self.storage.store_names()
  }
}
