use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors talking to the time tracking backend.
#[derive(Error, Debug)]
pub enum ApiError {
  /// The backend could not be reached (offline, refused, timed out)
  #[error("Backend unreachable: {0}")]
  Unreachable(String),

  #[error("HTTP request failed: {0}")]
  Request(String),

  #[error("Server returned {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Invalid response: {0}")]
  Decode(String),

  #[error("Invalid input: {0}")]
  Invalid(String),
}

impl ApiError {
  /// The write never reached the backend and can be queued for later.
  pub fn is_connectivity(&self) -> bool {
    matches!(self, Self::Unreachable(_))
  }

  /// Worth retrying: connectivity, server errors and rate limiting.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Unreachable(_) => true,
      Self::Status { status, .. } => *status >= 500 || *status == 429,
      _ => false,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_connect() || err.is_timeout() {
      Self::Unreachable(err.to_string())
    } else if err.is_decode() {
      Self::Decode(err.to_string())
    } else {
      Self::Request(err.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn status(code: u16) -> ApiError {
    ApiError::Status {
      status: code,
      message: "x".into(),
    }
  }

  #[test]
  fn test_retryable_classification() {
    assert!(ApiError::Unreachable("refused".into()).is_retryable());
    assert!(status(503).is_retryable());
    assert!(status(429).is_retryable());
    assert!(!status(400).is_retryable());
    assert!(!status(404).is_retryable());
    assert!(!ApiError::Invalid("bad".into()).is_retryable());
  }

  #[test]
  fn test_only_unreachable_is_connectivity() {
    assert!(ApiError::Unreachable("refused".into()).is_connectivity());
    assert!(!status(503).is_connectivity());
  }
}
