use async_trait::async_trait;
use color_eyre::eyre::eyre;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::error::{ApiError, Result};
use super::types::{
  EntryInput, EntryQuery, ErrorBody, OcrEntry, OcrRequest, OcrResponse, ReportRequest, Stats,
  TimeEntry,
};
use crate::worker::{PendingWrite, ReplayError, Replayer, WriteMethod};

/// HTTP client for the time tracking API.
#[derive(Debug, Clone)]
pub struct ApiClient {
  client: reqwest::Client,
  base_url: String,
}

impl ApiClient {
  /// Create a client for the API rooted at `base_url`, e.g.
  /// `http://localhost:5000/api`.
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> color_eyre::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  pub async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<TimeEntry>> {
    let response = self
      .client
      .get(self.url("/entries"))
      .query(query)
      .send()
      .await?;
    handle_json(response).await
  }

  /// Send a write to the backend and return its reply, `Null` when the
  /// reply has no body.
  pub async fn send(&self, write: &PendingWrite) -> Result<serde_json::Value> {
    let response = self.execute(write).await?;
    let body = response.bytes().await?;
    Ok(parse_reply(&body))
  }

  /// Send a write and check its status without reading the reply.
  async fn execute(&self, write: &PendingWrite) -> Result<reqwest::Response> {
    let method = match write.method {
      WriteMethod::Post => Method::POST,
      WriteMethod::Put => Method::PUT,
      WriteMethod::Delete => Method::DELETE,
    };
    debug!(%write, "sending");

    let mut request = self.client.request(method, self.url(&write.path));
    if let Some(body) = &write.body {
      request = request.json(body);
    }

    let response = request.send().await?;
    check_status(response).await
  }

  /// Extract time entries from a timesheet image.
  pub async fn ocr(&self, request: &OcrRequest) -> Result<Vec<OcrEntry>> {
    let response = self
      .client
      .post(self.url("/ocr"))
      .json(request)
      .send()
      .await?;
    let body: OcrResponse = handle_json(response).await?;
    Ok(body.entries)
  }

  pub async fn stats(&self) -> Result<Stats> {
    let response = self.client.get(self.url("/stats")).send().await?;
    handle_json(response).await
  }

  /// Generate a report; returns the PDF bytes.
  pub async fn report(&self, request: &ReportRequest) -> Result<Vec<u8>> {
    let response = self
      .client
      .post(self.url("/report"))
      .json(request)
      .send()
      .await?;
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
  }
}

#[async_trait]
impl Replayer for ApiClient {
  async fn replay(&self, write: &PendingWrite) -> std::result::Result<(), ReplayError> {
    match self.execute(write).await {
      Ok(_) => Ok(()),
      Err(e) if e.is_retryable() => Err(ReplayError::Transient(e.to_string())),
      Err(e) => Err(ReplayError::Rejected(e.to_string())),
    }
  }
}

/// The write that creates `entry`.
pub fn create_write(entry: &EntryInput) -> Result<PendingWrite> {
  Ok(PendingWrite::new(
    WriteMethod::Post,
    "/entries",
    Some(to_body(entry)?),
  ))
}

pub fn update_write(id: i64, entry: &EntryInput) -> Result<PendingWrite> {
  Ok(PendingWrite::new(
    WriteMethod::Put,
    format!("/entries/{}", id),
    Some(to_body(entry)?),
  ))
}

pub fn delete_write(id: i64) -> PendingWrite {
  PendingWrite::new(WriteMethod::Delete, format!("/entries/{}", id), None)
}

fn to_body(entry: &EntryInput) -> Result<serde_json::Value> {
  serde_json::to_value(entry).map_err(|e| ApiError::Invalid(e.to_string()))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response
    .text()
    .await
    .unwrap_or_else(|_| "Unknown error".to_string());
  Err(ApiError::Status {
    status: status.as_u16(),
    message: error_message(&body),
  })
}

async fn handle_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
  let response = check_status(response).await?;
  response
    .json()
    .await
    .map_err(|e| ApiError::Decode(e.to_string()))
}

/// Writes may answer with no body (204) or plain text; only JSON is parsed.
fn parse_reply(body: &[u8]) -> serde_json::Value {
  if body.iter().all(u8::is_ascii_whitespace) {
    return serde_json::Value::Null;
  }
  serde_json::from_slice(body)
    .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).trim().to_string()))
}

/// The backend reports failures as `{"error": "..."}`; fall back to the raw
/// body for anything else.
fn error_message(body: &str) -> String {
  match serde_json::from_str::<ErrorBody>(body) {
    Ok(parsed) => parsed.error,
    Err(_) if body.trim().is_empty() => "Unknown error".to_string(),
    Err(_) => body.trim().to_string(),
  }
}
