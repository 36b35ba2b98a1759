//! Request interception: answer reads from the cache store, the network or
//! the offline page.

use std::sync::Arc;
use tracing::{debug, warn};

use super::fallback;
use super::lifecycle::WorkerConfig;
use crate::cache::{CacheLayer, CacheResult, CacheStorage, CacheVersion, RequestKey};
use crate::net::{FetchError, Network, Request, Response};

/// What the interceptor did with a request.
#[derive(Debug)]
pub enum Intercepted {
  /// Not handled; the host sends the request itself.
  Passthrough,
  /// Answered from the cache or the network.
  Served(CacheResult<Response>),
  /// Navigation that could not be answered; offline page substituted.
  Fallback(Response),
  /// Subresource that could not be answered.
  Failed(FetchError),
}

pub struct RequestInterceptor<S: CacheStorage> {
  config: Arc<WorkerConfig>,
  cache: CacheLayer<S>,
  network: Arc<dyn Network>,
}

impl<S: CacheStorage> RequestInterceptor<S> {
  pub fn new(config: Arc<WorkerConfig>, storage: Arc<S>, network: Arc<dyn Network>) -> Self {
    let cache = CacheLayer::new(storage).with_strategy(config.strategy);
    Self {
      config,
      cache,
      network,
    }
  }

  /// Handle one outgoing request against the store of `version`.
  ///
  /// Requests with side effects are passed through without touching the
  /// cache store. Network responses are cached only when they are a 200
  /// from the worker's own origin.
  pub async fn intercept(&self, version: &CacheVersion, request: &Request) -> Intercepted {
    let Some(key) = RequestKey::for_request(request) else {
      debug!(method = %request.method, url = %request.url, "not a read, passing through");
      return Intercepted::Passthrough;
    };

    let origin = &self.config.origin;
    let result = self
      .cache
      .fetch(
        version.as_str(),
        &key,
        || self.network.fetch(request),
        |response| response.status == 200 && response.is_same_origin(origin),
      )
      .await;

    match result {
      Ok(served) => Intercepted::Served(served),
      Err(err) if request.is_navigation() => {
        warn!(%key, error = %err, "navigation failed, serving offline page");
        Intercepted::Fallback(fallback::offline_document(&request.url))
      }
      Err(err) => {
        warn!(%key, error = %err, "fetch failed with no cached copy");
        Intercepted::Failed(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, CacheStrategy, SqliteStorage};
  use crate::testing::{worker_config, CountingStorage, MockNetwork};
  use reqwest::Method;
  use url::Url;

  fn v1() -> CacheVersion {
    CacheVersion::new("v1")
  }

  fn url(path: &str) -> Url {
    Url::parse(&format!("http://localhost:5000{}", path)).unwrap()
  }

  fn interceptor(
    config: WorkerConfig,
    storage: Arc<CountingStorage>,
    network: Arc<MockNetwork>,
  ) -> RequestInterceptor<CountingStorage> {
    RequestInterceptor::new(Arc::new(config), storage, network)
  }

  #[tokio::test]
  async fn test_cached_read_skips_network() {
    let storage = Arc::new(CountingStorage::new());
    storage
      .inner
      .put_entry("v1", &RequestKey::get(&url("/reports")), &Response::new(200, url("/reports"), "cached"))
      .unwrap();
    let network = Arc::new(MockNetwork::new());
    let interceptor = interceptor(worker_config("v1", &[]), storage, network.clone());

    let result = interceptor.intercept(&v1(), &Request::get(url("/reports"))).await;

    match result {
      Intercepted::Served(served) => {
        assert_eq!(served.source, CacheSource::Cache);
        assert_eq!(served.data.text(), "cached");
      }
      other => panic!("expected cached response, got {:?}", other),
    }
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_miss_fetches_and_populates_cache() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::new());
    network.respond("http://localhost:5000/upload_image", 200, "<html>upload</html>");
    let interceptor = interceptor(worker_config("v1", &[]), storage.clone(), network.clone());

    let result = interceptor.intercept(&v1(), &Request::get(url("/upload_image"))).await;

    let served = match result {
      Intercepted::Served(served) => served,
      other => panic!("expected network response, got {:?}", other),
    };
    assert_eq!(served.source, CacheSource::Network);
    assert_eq!(network.calls(), 1);

    let cached = storage
      .inner
      .get_entry("v1", &RequestKey::get(&url("/upload_image")))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.status, served.data.status);
    assert_eq!(cached.response.body, served.data.body);
  }

  #[tokio::test]
  async fn test_second_read_is_served_from_cache() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::new());
    network.respond("http://localhost:5000/add_order", 200, "form");
    let interceptor = interceptor(worker_config("v1", &[]), storage, network.clone());

    interceptor.intercept(&v1(), &Request::get(url("/add_order"))).await;
    let second = interceptor.intercept(&v1(), &Request::get(url("/add_order"))).await;

    assert!(matches!(second, Intercepted::Served(ref s) if s.source == CacheSource::Cache));
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_non_success_is_returned_but_not_cached() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::new());
    network.respond("http://localhost:5000/gone", 404, "not found");
    let interceptor = interceptor(worker_config("v1", &[]), storage.clone(), network);

    let result = interceptor.intercept(&v1(), &Request::get(url("/gone"))).await;

    assert!(matches!(result, Intercepted::Served(ref s) if s.data.status == 404));
    assert_eq!(storage.writes(), 0);
  }

  #[tokio::test]
  async fn test_cross_origin_response_is_not_cached() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::new());
    network.respond("https://cdn.jsdelivr.net/npm/chart.js", 200, "chart");
    let interceptor = interceptor(worker_config("v1", &[]), storage.clone(), network);

    let request = Request::get(Url::parse("https://cdn.jsdelivr.net/npm/chart.js").unwrap());
    let result = interceptor.intercept(&v1(), &request).await;

    assert!(matches!(result, Intercepted::Served(_)));
    assert_eq!(storage.writes(), 0);
  }

  #[tokio::test]
  async fn test_offline_navigation_gets_fallback_page() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::offline());
    let interceptor = interceptor(worker_config("v1", &[]), storage, network);

    let result = interceptor.intercept(&v1(), &Request::navigate(url("/reports"))).await;

    match result {
      Intercepted::Fallback(response) => {
        assert!(response.text().contains("You're Offline"));
        assert_eq!(response.header("content-type"), Some("text/html"));
      }
      other => panic!("expected fallback page, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_offline_subresource_fails() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::offline());
    let interceptor = interceptor(worker_config("v1", &[]), storage, network);

    let result = interceptor.intercept(&v1(), &Request::get(url("/static/app.js"))).await;

    assert!(matches!(result, Intercepted::Failed(FetchError::Offline(_))));
  }

  #[tokio::test]
  async fn test_writes_never_touch_cache() {
    let storage = Arc::new(CountingStorage::new());
    let network = Arc::new(MockNetwork::new());
    let interceptor = interceptor(worker_config("v1", &[]), storage.clone(), network.clone());

    for method in [Method::DELETE, Method::POST, Method::PUT] {
      let result = interceptor
        .intercept(&v1(), &Request::new(method, url("/api/entries/7")))
        .await;
      assert!(matches!(result, Intercepted::Passthrough));
    }

    assert_eq!(storage.reads(), 0);
    assert_eq!(storage.writes(), 0);
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_network_first_refreshes_cached_copy() {
    let storage = Arc::new(CountingStorage::new());
    storage
      .inner
      .put_entry("v1", &RequestKey::get(&url("/")), &Response::new(200, url("/"), "old"))
      .unwrap();
    let network = Arc::new(MockNetwork::new());
    network.respond("http://localhost:5000/", 200, "new");
    let mut config = worker_config("v1", &[]);
    config.strategy = CacheStrategy::NetworkFirst;
    let interceptor = interceptor(config, storage.clone(), network.clone());

    let result = interceptor.intercept(&v1(), &Request::navigate(url("/"))).await;

    assert!(matches!(result, Intercepted::Served(ref s) if s.data.text() == "new"));
    assert_eq!(network.calls(), 1);
    let cached = storage
      .inner
      .get_entry("v1", &RequestKey::get(&url("/")))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.text(), "new");
  }

  #[tokio::test]
  async fn test_sqlite_backed_interceptor() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let network = Arc::new(MockNetwork::new());
    network.respond("http://localhost:5000/", 200, "home");
    let interceptor =
      RequestInterceptor::new(Arc::new(worker_config("v1", &[])), storage.clone(), network);

    interceptor.intercept(&v1(), &Request::navigate(url("/"))).await;

    assert!(storage
      .get_entry("v1", &RequestKey::get(&url("/")))
      .unwrap()
      .is_some());
  }
}
