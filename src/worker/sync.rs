//! Deferred sync: writes made while offline are queued and replayed when
//! the host signals that connectivity is back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Report, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tag under which time entry writes are queued.
pub const TIME_ENTRY_SYNC: &str = "time-entry-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteMethod {
  Post,
  Put,
  Delete,
}

impl WriteMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Delete => "DELETE",
    }
  }
}

impl fmt::Display for WriteMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WriteMethod {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "POST" => Ok(Self::Post),
      "PUT" => Ok(Self::Put),
      "DELETE" => Ok(Self::Delete),
      other => Err(eyre!("Unsupported queued method '{}'", other)),
    }
  }
}

/// A backend write waiting to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
  pub method: WriteMethod,
  /// Path relative to the API base, e.g. `/entries/4`
  pub path: String,
  pub body: Option<serde_json::Value>,
}

impl PendingWrite {
  pub fn new(method: WriteMethod, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
    Self {
      method,
      path: path.into(),
      body,
    }
  }
}

impl fmt::Display for PendingWrite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.path)
  }
}

/// A write as stored in the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedWrite {
  pub id: i64,
  pub tag: String,
  pub write: PendingWrite,
  /// Failed attempts so far, across signals
  pub attempts: u32,
  pub last_error: Option<String>,
  pub queued_at: DateTime<Utc>,
}

/// Persistence for sync registrations and the outbox.
pub trait SyncStorage: Send + Sync {
  /// Record intent to sync under `tag`. Registering twice is a no-op.
  fn register_tag(&self, tag: &str) -> Result<()>;

  fn registered_tags(&self) -> Result<Vec<String>>;

  /// Remove a registration. Returns false if it was not registered.
  fn take_tag(&self, tag: &str) -> Result<bool>;

  fn enqueue_write(&self, tag: &str, write: &PendingWrite) -> Result<i64>;

  /// Queued writes for `tag`, oldest first.
  fn queued_writes(&self, tag: &str) -> Result<Vec<QueuedWrite>>;

  fn remove_write(&self, id: i64) -> Result<()>;

  /// Add `attempts` to the failure count and remember the last error.
  fn record_failure(&self, id: i64, attempts: u32, error: &str) -> Result<()>;
}

/// Why a replay did not go through.
#[derive(Error, Debug)]
pub enum ReplayError {
  /// Worth trying again later (offline, timeout, server error)
  #[error("transient failure: {0}")]
  Transient(String),

  /// The backend refused the write; retrying cannot help
  #[error("rejected: {0}")]
  Rejected(String),
}

/// Sends a queued write to the backend.
#[async_trait]
pub trait Replayer: Send + Sync {
  async fn replay(&self, write: &PendingWrite) -> std::result::Result<(), ReplayError>;
}

/// Bounded exponential backoff, optionally jittered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Attempts per write per sync signal (at least one is always made)
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  pub jitter: bool,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(500),
      max_delay: Duration::from_secs(10),
      jitter: true,
    }
  }
}

impl RetryPolicy {
  /// A single attempt with no waiting.
  pub fn once() -> Self {
    Self {
      max_attempts: 1,
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
      jitter: false,
    }
  }

  /// Un-jittered delay after the `failures`-th failed attempt:
  /// `base * 2^(failures - 1)`, capped at `max_delay`.
  pub fn backoff(&self, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(31);
    self
      .base_delay
      .saturating_mul(1u32 << exponent)
      .min(self.max_delay)
  }

  /// Delay to actually wait; with jitter it is drawn from
  /// `[backoff / 2, backoff]`.
  pub fn delay(&self, failures: u32) -> Duration {
    let backoff = self.backoff(failures);
    if !self.jitter || backoff.is_zero() {
      return backoff;
    }

    let upper = backoff.as_millis() as u64;
    let millis = rand::rng().random_range(upper / 2..=upper);
    Duration::from_millis(millis)
  }

  fn attempts(&self) -> u32 {
    self.max_attempts.max(1)
  }
}

/// Outcome of one sync signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub tag: String,
  /// The tag is not one this worker handles
  pub ignored: bool,
  /// Queue ids sent successfully
  pub replayed: Vec<i64>,
  /// Queue ids the backend rejected, with the reason; removed from the queue
  pub dropped: Vec<(i64, String)>,
  /// Queue ids still waiting after exhausting their attempts
  pub pending: Vec<i64>,
}

enum ReplayOutcome {
  Sent,
  Rejected(String),
  Pending { failures: u32, error: String },
}

/// Deferred-sync queue backed by persistent storage.
pub struct SyncQueue<Q: SyncStorage> {
  storage: Arc<Q>,
  replayer: Arc<dyn Replayer>,
  policy: RetryPolicy,
  /// Held for the whole of a sync so overlapping signals never replay the
  /// same write twice
  syncing: Mutex<()>,
}

impl<Q: SyncStorage> SyncQueue<Q> {
  pub fn new(storage: Arc<Q>, replayer: Arc<dyn Replayer>, policy: RetryPolicy) -> Self {
    Self {
      storage,
      replayer,
      policy,
      syncing: Mutex::new(()),
    }
  }

  pub fn register(&self, tag: &str) -> Result<()> {
    debug!(tag, "sync registered");
    self.storage.register_tag(tag)
  }

  pub fn registered_tags(&self) -> Result<Vec<String>> {
    self.storage.registered_tags()
  }

  /// Persist a time entry write and register the sync that will send it.
  pub fn enqueue(&self, write: &PendingWrite) -> Result<i64> {
    let id = self.storage.enqueue_write(TIME_ENTRY_SYNC, write)?;
    self.register(TIME_ENTRY_SYNC)?;
    info!(id, %write, "write queued for sync");
    Ok(id)
  }

  pub fn pending(&self) -> Result<Vec<QueuedWrite>> {
    self.storage.queued_writes(TIME_ENTRY_SYNC)
  }

  /// React to the host's sync signal.
  ///
  /// The registration is consumed exactly once: signals are handled one at
  /// a time, and one that finds no registration does nothing. Each queued
  /// write is replayed in order under the retry policy; if any remain
  /// afterwards the tag is registered again so the next signal picks them up.
  pub async fn on_sync_signal(&self, tag: &str) -> Result<SyncReport> {
    let mut report = SyncReport {
      tag: tag.to_string(),
      ..Default::default()
    };

    if tag != TIME_ENTRY_SYNC {
      debug!(tag, "ignoring unknown sync tag");
      report.ignored = true;
      return Ok(report);
    }

    let _syncing = self.syncing.lock().await;
    if !self.storage.take_tag(tag)? {
      debug!(tag, "no sync registered, nothing to replay");
      return Ok(report);
    }

    let queued = self.storage.queued_writes(tag)?;
    info!(tag, queued = queued.len(), "syncing queued writes");

    for item in queued {
      match self.replay(&item.write).await {
        ReplayOutcome::Sent => {
          self.storage.remove_write(item.id)?;
          report.replayed.push(item.id);
        }
        ReplayOutcome::Rejected(reason) => {
          warn!(id = item.id, write = %item.write, %reason, "queued write rejected, dropping");
          self.storage.remove_write(item.id)?;
          report.dropped.push((item.id, reason));
        }
        ReplayOutcome::Pending { failures, error } => {
          warn!(id = item.id, write = %item.write, %error, "queued write still failing");
          self.storage.record_failure(item.id, failures, &error)?;
          report.pending.push(item.id);
        }
      }
    }

    if !report.pending.is_empty() {
      self.storage.register_tag(tag)?;
    }

    info!(
      tag,
      replayed = report.replayed.len(),
      dropped = report.dropped.len(),
      pending = report.pending.len(),
      "sync finished"
    );

    Ok(report)
  }

  async fn replay(&self, write: &PendingWrite) -> ReplayOutcome {
    let attempts = self.policy.attempts();
    let mut failures = 0;

    loop {
      match self.replayer.replay(write).await {
        Ok(()) => return ReplayOutcome::Sent,
        Err(ReplayError::Rejected(reason)) => return ReplayOutcome::Rejected(reason),
        Err(ReplayError::Transient(error)) => {
          failures += 1;
          if failures >= attempts {
            return ReplayOutcome::Pending { failures, error };
          }

          let delay = self.policy.delay(failures);
          debug!(%write, failures, ?delay, "retrying queued write");
          tokio::time::sleep(delay).await;
        }
      }
    }
  }
}
