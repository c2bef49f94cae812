//! HTTP client for the device controller.
//!
//! The controller exposes two endpoints:
//!
//! - `POST {base}/led` with body `{"state":"ON"|"OFF"}`
//! - `GET {base}/health`
//!
//! Any 2xx response is success. Requests carry no timeout of their own
//! unless one is set with [`HttpController::command_timeout`] or
//! [`HttpController::health_timeout`]; inside a [`Hub`](crate::Hub) each
//! attempt is bounded by the hub's configured timeouts instead.
//!
//! # Example
//!
//! ```no_run
//! use homelink_core::{Controller, HttpController, LedState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = HttpController::new("http://10.0.2.2:8080")?;
//! controller.health().await?;
//! controller.send_state(LedState::On).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{Controller, LedCommand, LedState};

/// Normalize a base URL: trim whitespace and trailing slashes, require an
/// http(s) scheme.
pub fn normalize_base_url(url: &str) -> Result<String> {
    let base_url = url.trim().trim_end_matches('/').to_string();

    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(Error::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }

    Ok(base_url)
}

/// Controller reached over HTTP.
#[derive(Debug)]
pub struct HttpController {
    client: Client,
    base_url: RwLock<String>,
    command_timeout: Option<Duration>,
    health_timeout: Option<Duration>,
}

impl HttpController {
    /// Create a controller client for `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::with_client(base_url, client)
    }

    /// Create a controller client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: RwLock::new(normalize_base_url(base_url)?),
            command_timeout: None,
            health_timeout: None,
        })
    }

    /// Per-request timeout for `POST /led`.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Per-request timeout for `GET /health`.
    #[must_use]
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = Some(timeout);
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self
            .base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        format!("{}{}", base, path)
    }

    fn check(response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::HttpStatus {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Controller for HttpController {
    async fn send_state(&self, state: LedState) -> Result<()> {
        let url = self.url("/led");
        debug!("POST {} state={}", url, state);
        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&LedCommand { state });
        if let Some(timeout) = self.command_timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(e, "POST /led", self.command_timeout))?;
        Self::check(&response)
    }

    async fn health(&self) -> Result<()> {
        let url = self.url("/health");
        debug!("GET {}", url);
        let mut request = self.client.get(&url);
        if let Some(timeout) = self.health_timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(e, "GET /health", self.health_timeout))?;
        Self::check(&response)
    }

    fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_base_url(&self, url: &str) -> Result<()> {
        let normalized = normalize_base_url(url)?;
        *self
            .base_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = normalized;
        Ok(())
    }
}

fn map_request_error(err: reqwest::Error, operation: &str, bound: Option<Duration>) -> Error {
    match bound {
        Some(bound) if err.is_timeout() => Error::timeout(operation, bound),
        _ => Error::from(err),
    }
}
