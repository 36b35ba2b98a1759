use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;

use super::error::FetchError;
use super::types::{Request, Response};

/// Something that can put a request on the wire.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> std::result::Result<Response, FetchError>;
}

/// `reqwest`-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> std::result::Result<Response, FetchError> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await?;

    let status = response.status().as_u16();
    let url = response.url().clone();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      status,
      headers,
      body,
      url,
    })
  }
}
