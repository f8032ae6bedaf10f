/// OMW water temperature API client.
///
/// Issues a single GET against:
///   https://api.omw.hu/water_temp_hu.php
///
/// No parameters, no authentication. The whole exchange (connect, send,
/// body) is bounded by one timeout; there are no retries here. A failed
/// fetch is retried by the next coordinator tick or, during setup, by the
/// host's entry retry.

use crate::model::{FetchError, API_URL, REQUEST_TIMEOUT};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Anything that can produce the raw water temperature payload.
#[async_trait]
pub trait WaterSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;
}

/// Fetcher backed by the host's shared `reqwest::Client`.
///
/// The client is only borrowed for requests; it is never closed or
/// reconfigured here.
#[derive(Debug, Clone)]
pub struct OmwClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl OmwClient {
    /// Client for the public endpoint with the default 10 second timeout.
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, API_URL, REQUEST_TIMEOUT)
    }

    pub fn with_endpoint(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(FetchError::Network)?;

        let status = response.status();
        if status != StatusCode::OK {
            log::error!("API error: {}", status);
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(FetchError::Network)?;
        log::debug!("Received {} bytes from {}", body.len(), self.url);

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WaterSource for OmwClient {
    async fn fetch(&self) -> Result<Value, FetchError> {
        match tokio::time::timeout(self.timeout, self.request()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
