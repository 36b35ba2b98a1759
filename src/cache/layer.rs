//! Cache layer that orchestrates caching logic with network fetching.

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::{CacheStorage, CachedEntry};
use super::traits::{CacheResult, RequestKey};
use crate::net::{FetchError, Response};

/// Order in which the cache and the network are consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
  /// Serve any cached copy without checking freshness; only go to the
  /// network on a miss.
  #[default]
  CacheFirst,
  /// Always try the network; fall back to the cache when it fails.
  NetworkFirst,
}

/// Cache layer that manages caching logic and network fetching.
///
/// Storage failures never fail a fetch: a failed read is a miss and a
/// failed write is skipped.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  strategy: CacheStrategy,
}

impl<S: CacheStorage> CacheLayer<S> {
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      strategy: CacheStrategy::default(),
    }
  }

  pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  /// Fetch a response for `key` from `store`, going to the network through
  /// `fetcher` when the strategy calls for it.
  ///
  /// Network responses for which `cacheable` returns true are written to
  /// the store before being returned.
  pub async fn fetch<F, Fut, C>(
    &self,
    store: &str,
    key: &RequestKey,
    fetcher: F,
    cacheable: C,
  ) -> Result<CacheResult<Response>, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, FetchError>>,
    C: Fn(&Response) -> bool,
  {
    match self.strategy {
      CacheStrategy::CacheFirst => {
        if let Some(cached) = self.lookup(store, key) {
          debug!(%key, "cache hit");
          return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
        }

        debug!(%key, "cache miss");
        let response = fetcher().await?;
        self.store_if(store, key, &response, &cacheable);
        Ok(CacheResult::from_network(response))
      }
      CacheStrategy::NetworkFirst => match fetcher().await {
        Ok(response) => {
          self.store_if(store, key, &response, &cacheable);
          Ok(CacheResult::from_network(response))
        }
        Err(err) => match self.lookup(store, key) {
          Some(cached) => {
            debug!(%key, error = %err, "network failed, serving cached copy");
            Ok(CacheResult::offline(cached.response, cached.cached_at))
          }
          None => Err(err),
        },
      },
    }
  }

  fn lookup(&self, store: &str, key: &RequestKey) -> Option<CachedEntry> {
    match self.storage.get_entry(store, key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(%key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn store_if<C>(&self, store: &str, key: &RequestKey, response: &Response, cacheable: &C)
  where
    C: Fn(&Response) -> bool,
  {
    if !cacheable(response) {
      debug!(%key, status = response.status, "response not cacheable");
      return;
    }

    if let Err(e) = self.storage.put_entry(store, key, response) {
      warn!(%key, error = %e, "cache write failed");
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      strategy: self.strategy,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use url::Url;

  fn url(path: &str) -> Url {
    Url::parse(&format!("http://localhost:5000{}", path)).unwrap()
  }

  fn layer(strategy: CacheStrategy) -> CacheLayer<SqliteStorage> {
    CacheLayer::new(Arc::new(SqliteStorage::open_in_memory().unwrap())).with_strategy(strategy)
  }

  #[tokio::test]
  async fn test_cache_first_prefers_cache() {
    let layer = layer(CacheStrategy::CacheFirst);
    let key = RequestKey::get(&url("/"));
    layer
      .storage
      .put_entry("v1", &key, &Response::new(200, url("/"), "cached"))
      .unwrap();

    let result = layer
      .fetch(
        "v1",
        &key,
        || async { Ok(Response::new(200, url("/"), "fresh")) },
        |_| true,
      )
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.text(), "cached");
    assert!(result.cached_at.is_some());
  }

  #[tokio::test]
  async fn test_network_first_prefers_network_and_refreshes() {
    let layer = layer(CacheStrategy::NetworkFirst);
    let key = RequestKey::get(&url("/"));
    layer
      .storage
      .put_entry("v1", &key, &Response::new(200, url("/"), "cached"))
      .unwrap();

    let result = layer
      .fetch(
        "v1",
        &key,
        || async { Ok(Response::new(200, url("/"), "fresh")) },
        |_| true,
      )
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.text(), "fresh");
    let stored = layer.storage.get_entry("v1", &key).unwrap().unwrap();
    assert_eq!(stored.response.text(), "fresh");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_cache() {
    let layer = layer(CacheStrategy::NetworkFirst);
    let key = RequestKey::get(&url("/reports"));
    layer
      .storage
      .put_entry("v1", &key, &Response::new(200, url("/reports"), "cached"))
      .unwrap();

    let result = layer
      .fetch(
        "v1",
        &key,
        || async { Err(FetchError::Offline("down".into())) },
        |_| true,
      )
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.text(), "cached");
  }

  #[tokio::test]
  async fn test_uncacheable_response_is_not_stored() {
    let layer = layer(CacheStrategy::CacheFirst);
    let key = RequestKey::get(&url("/missing"));

    let result = layer
      .fetch(
        "v1",
        &key,
        || async { Ok(Response::new(404, url("/missing"), "nope")) },
        |r| r.status == 200,
      )
      .await
      .unwrap();

    assert_eq!(result.data.status, 404);
    assert!(layer.storage.get_entry("v1", &key).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_miss_without_network_is_error() {
    let layer = layer(CacheStrategy::CacheFirst);
    let key = RequestKey::get(&url("/"));

    let result = layer
      .fetch(
        "v1",
        &key,
        || async { Err(FetchError::Offline("down".into())) },
        |_| true,
      )
      .await;

    assert!(matches!(result, Err(FetchError::Offline(_))));
  }
}
