//! Core types for the request cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::net::Request;

/// Name of a versioned cache store, e.g. `time-tracker-v2.0.0`.
///
/// Exactly one version is current at a time; rotating it is the only way
/// to invalidate everything cached under the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion(String);

impl CacheVersion {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Normalized identity of a cacheable request: method plus URL.
///
/// Only read requests have a key. The fragment is dropped since it never
/// reaches the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  /// Key for a `GET` of the given URL.
  pub fn get(url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: "GET".to_string(),
      url: url.to_string(),
    }
  }

  /// Key for an intercepted request, `None` if the request has side effects.
  pub fn for_request(request: &Request) -> Option<Self> {
    request.is_read().then(|| Self::get(&request.url))
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Cached data served because the network failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cache hit, network not consulted
  Cache,
  /// Network unavailable, serving cached data
  Offline,
}

impl fmt::Display for CacheSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "cache (offline)",
    };
    f.write_str(label)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;

  #[test]
  fn test_key_ignores_fragment() {
    let a = RequestKey::get(&Url::parse("http://localhost:5000/reports#week").unwrap());
    let b = RequestKey::get(&Url::parse("http://localhost:5000/reports").unwrap());
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_key_distinguishes_query() {
    let a = RequestKey::get(&Url::parse("http://localhost:5000/api/entries?employee=a").unwrap());
    let b = RequestKey::get(&Url::parse("http://localhost:5000/api/entries?employee=b").unwrap());
    assert_ne!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_no_key_for_writes() {
    let url = Url::parse("http://localhost:5000/api/entries/3").unwrap();
    assert!(RequestKey::for_request(&Request::new(Method::DELETE, url.clone())).is_none());
    assert!(RequestKey::for_request(&Request::get(url)).is_some());
  }

  #[test]
  fn test_hash_is_hex_sha256() {
    let key = RequestKey::get(&Url::parse("http://localhost:5000/").unwrap());
    let hash = key.cache_hash();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
