use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// What the requester intends to do with the response.
///
/// Only `Document` matters to the worker: it marks a navigation, which is
/// the one kind of request that gets a synthesized offline page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Font,
  Manifest,
  #[default]
  Empty,
}

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      destination: Destination::Empty,
    }
  }

  /// A plain `GET` for a subresource.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A `GET` for a full document.
  pub fn navigate(url: Url) -> Self {
    Self::get(url).with_destination(Destination::Document)
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Read requests have no side effects and are the only ones the worker
  /// intercepts.
  pub fn is_read(&self) -> bool {
    self.method == Method::GET
  }

  pub fn is_navigation(&self) -> bool {
    self.destination == Destination::Document
  }
}

/// A captured response: status, headers and a fully buffered body.
///
/// The body is owned, so handing one copy to the cache and another to the
/// caller is a plain `clone()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  /// Final URL after redirects
  pub url: Url,
}

impl Response {
  pub fn new(status: u16, url: Url, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
      url,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_lowercase(), value.to_string()));
    self
  }

  /// Any 2xx status.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the response was served by the given origin.
  pub fn is_same_origin(&self, origin: &Url) -> bool {
    self.url.origin() == origin.origin()
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_only_get_is_read() {
    assert!(Request::get(url("http://localhost:5000/")).is_read());
    assert!(!Request::new(Method::DELETE, url("http://localhost:5000/api/entries/1")).is_read());
    assert!(!Request::new(Method::POST, url("http://localhost:5000/api/entries")).is_read());
  }

  #[test]
  fn test_navigate_is_navigation() {
    assert!(Request::navigate(url("http://localhost:5000/reports")).is_navigation());
    assert!(!Request::get(url("http://localhost:5000/app.js")).is_navigation());
  }

  #[test]
  fn test_same_origin() {
    let origin = url("http://localhost:5000");
    let local = Response::new(200, url("http://localhost:5000/static/manifest.json"), "{}");
    let cdn = Response::new(200, url("https://cdn.jsdelivr.net/npm/chart.js"), "");
    assert!(local.is_same_origin(&origin));
    assert!(!cdn.is_same_origin(&origin));
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response =
      Response::new(200, url("http://localhost:5000/"), "").with_header("Content-Type", "text/html");
    assert_eq!(response.header("content-type"), Some("text/html"));
    assert_eq!(response.header("CONTENT-TYPE"), Some("text/html"));
  }
}
