//! Test doubles shared by the worker and shell tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::cache::{CacheStorage, CacheStrategy, CacheVersion, CachedEntry, RequestKey, SqliteStorage};
use crate::net::{FetchError, Network, Request, Response};
use crate::worker::{PendingWrite, ReplayError, Replayer, WorkerConfig, WorkerState};

pub const ORIGIN: &str = "http://localhost:5000";

pub fn worker_config(version: &str, manifest: &[&str]) -> WorkerConfig {
  WorkerConfig {
    version: CacheVersion::new(version),
    origin: Url::parse(ORIGIN).unwrap(),
    manifest: manifest.iter().map(|s| s.to_string()).collect(),
    strategy: CacheStrategy::CacheFirst,
  }
}

/// Canned network. URLs without a canned response behave as if offline.
#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<String, (u16, String)>>,
  calls: AtomicUsize,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  /// Nothing is reachable.
  pub fn offline() -> Self {
    Self::default()
  }

  /// Serves every manifest asset of `config` with a 200.
  pub fn serving_manifest(config: &WorkerConfig) -> Self {
    let network = Self::new();
    for url in config.manifest_urls().unwrap() {
      network.respond(url.as_str(), 200, &format!("asset {}", url));
    }
    network
  }

  pub fn respond(&self, url: &str, status: u16, body: &str) {
    let url = Url::parse(url).unwrap();
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), (status, body.to_string()));
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> std::result::Result<Response, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();

    match route {
      Some((status, body)) => Ok(Response::new(status, request.url.clone(), body)),
      None => Err(FetchError::Offline(format!("no route to {}", request.url))),
    }
  }
}

/// SQLite storage that counts cache reads and writes.
pub struct CountingStorage {
  pub inner: SqliteStorage,
  reads: AtomicUsize,
  writes: AtomicUsize,
}

impl CountingStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      reads: AtomicUsize::new(0),
      writes: AtomicUsize::new(0),
    }
  }

  pub fn reads(&self) -> usize {
    self.reads.load(Ordering::SeqCst)
  }

  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }
}

impl CacheStorage for CountingStorage {
  fn store_names(&self) -> Result<Vec<String>> {
    self.inner.store_names()
  }

  fn open_store(&self, name: &str) -> Result<()> {
    self.inner.open_store(name)
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    self.inner.delete_store(name)
  }

  fn get_entry(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    self.inner.get_entry(store, key)
  }

  fn put_entry(&self, store: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.inner.put_entry(store, key, response)
  }

  fn put_all(&self, store: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.writes.fetch_add(entries.len(), Ordering::SeqCst);
    self.inner.put_all(store, entries)
  }

  fn load_state(&self, version: &str) -> Result<Option<WorkerState>> {
    self.inner.load_state(version)
  }

  fn save_state(&self, version: &str, state: WorkerState) -> Result<()> {
    self.inner.save_state(version, state)
  }

  fn active_version(&self) -> Result<Option<String>> {
    self.inner.active_version()
  }
}

/// SQLite storage whose deletion of one named store always fails.
pub struct FlakyDeleteStorage {
  pub inner: SqliteStorage,
  failing: String,
}

impl FlakyDeleteStorage {
  pub fn new(failing: &str) -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      failing: failing.to_string(),
    }
  }
}

impl CacheStorage for FlakyDeleteStorage {
  fn store_names(&self) -> Result<Vec<String>> {
    self.inner.store_names()
  }

  fn open_store(&self, name: &str) -> Result<()> {
    self.inner.open_store(name)
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    if name == self.failing {
      return Err(eyre!("disk I/O error deleting {}", name));
    }
    self.inner.delete_store(name)
  }

  fn get_entry(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    self.inner.get_entry(store, key)
  }

  fn put_entry(&self, store: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.inner.put_entry(store, key, response)
  }

  fn put_all(&self, store: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.inner.put_all(store, entries)
  }

  fn load_state(&self, version: &str) -> Result<Option<WorkerState>> {
    self.inner.load_state(version)
  }

  fn save_state(&self, version: &str, state: WorkerState) -> Result<()> {
    self.inner.save_state(version, state)
  }

  fn active_version(&self) -> Result<Option<String>> {
    self.inner.active_version()
  }
}

enum ReplayMode {
  Succeed,
  /// Fail transiently this many times, then succeed
  FailTransiently(u32),
  Reject,
}

/// Replayer that records what it was asked to send.
pub struct MockReplayer {
  mode: ReplayMode,
  delay: Duration,
  calls: AtomicUsize,
  sent: Mutex<Vec<PendingWrite>>,
}

impl MockReplayer {
  fn with_mode(mode: ReplayMode) -> Self {
    Self {
      mode,
      delay: Duration::ZERO,
      calls: AtomicUsize::new(0),
      sent: Mutex::new(Vec::new()),
    }
  }

  /// Take this long to answer each replay.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn succeeding() -> Self {
    Self::with_mode(ReplayMode::Succeed)
  }

  pub fn failing_transiently(times: u32) -> Self {
    Self::with_mode(ReplayMode::FailTransiently(times))
  }

  pub fn rejecting() -> Self {
    Self::with_mode(ReplayMode::Reject)
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Writes that were accepted, in order.
  pub fn sent(&self) -> Vec<PendingWrite> {
    self.sent.lock().unwrap().clone()
  }
}

#[async_trait]
impl Replayer for MockReplayer {
  async fn replay(&self, write: &PendingWrite) -> std::result::Result<(), ReplayError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }

    match self.mode {
      ReplayMode::Succeed => {}
      ReplayMode::FailTransiently(times) if (call as u64) < times as u64 => {
        return Err(ReplayError::Transient("connection refused".into()));
      }
      ReplayMode::FailTransiently(_) => {}
      ReplayMode::Reject => {
        return Err(ReplayError::Rejected("Order number is required".into()));
      }
    }

    self.sent.lock().unwrap().push(write.clone());
    Ok(())
  }
}
