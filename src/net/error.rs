use thiserror::Error;

/// Errors raised by the network collaborator.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("network unreachable: {0}")]
  Offline(String),

  #[error("request timed out: {0}")]
  Timeout(String),

  #[error("failed to read response body: {0}")]
  Body(String),

  #[error("request failed: {0}")]
  Other(String),
}

impl FetchError {
  /// Whether the failure means the backend could not be reached at all.
  pub fn is_connectivity(&self) -> bool {
    matches!(self, Self::Offline(_) | Self::Timeout(_))
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      Self::Timeout(err.to_string())
    } else if err.is_connect() {
      Self::Offline(err.to_string())
    } else if err.is_body() || err.is_decode() {
      Self::Body(err.to_string())
    } else {
      Self::Other(err.to_string())
    }
  }
}
