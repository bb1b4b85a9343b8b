//! HTTP client wrapper for the claims REST API
//!
//! The REST API is the source of truth; pushes only tell consumers when to re-fetch.

use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;

use crate::config::{Config, DEFAULT_API_URL};
use crate::error::{Error, Result};

/// Claims REST API client
#[derive(Debug, Clone)]
pub struct Client {
    http: ReqwestClient,
    base_url: String,
}

impl Client {
    /// Create a new client for the given base URL (e.g. `http://localhost:8000/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = ReqwestClient::builder().build().map_err(Error::Http)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client for the local development server
    pub fn local() -> Result<Self> {
        Self::new(DEFAULT_API_URL)
    }

    /// Create a client from a full configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_url.as_str())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the URL of an endpoint below the base URL
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Get the underlying HTTP client
    pub fn http(&self) -> &ReqwestClient {
        &self.http
    }

    /// GET an endpoint and decode its JSON body
    pub(crate) async fn get_json<R>(&self, path: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let url = self.endpoint_url(path);
        tracing::debug!(%url, "GET");

        let response = self.http.get(&url).send().await.map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            if let Some(message) = error_message(&body) {
                return Err(Error::Api(message));
            }
            return Err(Error::Api(format!("HTTP {} - {}", status.as_u16(), body)));
        }

        serde_json::from_str(&body).map_err(Error::Json)
    }
}

/// Pull a human-readable message out of a JSON error body
fn error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
