//! HTTP implementation of [`AdsRepository`]
//!
//! `POST {server}/preload` and `POST {server}/error` with JSON bodies.
//! Failures are classified into [`ApiError`] so the scheduler can tell
//! transient from permanent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::repository::{AdsRepository, ErrorReport, PreloadRequest};
use crate::domain::{Bid, PreloadOutcome};
use crate::error::{ApiError, ConfigError};

/// Body of a `/preload` answer. Every field is optional on the wire.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreloadResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub bids: Option<Vec<Bid>>,
    #[serde(default)]
    pub remote_log_level: Option<String>,
    /// Seconds
    #[serde(default)]
    pub preload_timeout: Option<u64>,
    #[serde(default)]
    pub err_code: Option<String>,
    #[serde(default)]
    pub permanent: Option<bool>,
}

impl PreloadResponse {
    /// Turn the body into an outcome, honouring a server-side `errCode`.
    pub fn into_outcome(self) -> Result<PreloadOutcome, ApiError> {
        if let Some(code) = self.err_code {
            return Err(if self.permanent == Some(true) {
                ApiError::Permanent { code }
            } else {
                ApiError::Temporary { code }
            });
        }

        Ok(PreloadOutcome {
            session_id: self.session_id,
            bids: self.bids,
            remote_log_level: self.remote_log_level,
            preload_timeout: self.preload_timeout.map(Duration::from_secs),
        })
    }
}

/// Map a reqwest failure onto the engine's error taxonomy.
pub fn classify_transport_error(error: &reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else if error.is_decode() {
        ApiError::Serialization {
            reason: error.to_string(),
        }
    } else if let Some(status) = error.status() {
        ApiError::Http {
            status: status.as_u16(),
        }
    } else if error.is_connect() || error.is_request() {
        ApiError::Connection {
            reason: error.to_string(),
        }
    } else {
        ApiError::Unexpected {
            reason: error.to_string(),
        }
    }
}

/// Repository talking to the real ad server.
pub struct HttpAdsRepository {
    client: Client,
    base_url: String,
}

impl HttpAdsRepository {
    /// `base_url` is the ad server root without trailing slash
    /// (as produced by [`AdsConfig`](crate::config::AdsConfig)).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .user_agent(concat!("chat-ads/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client".into(),
                reason: e.to_string(),
            })?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl AdsRepository for HttpAdsRepository {
    async fn preload(
        &self,
        request: &PreloadRequest,
        timeout: Duration,
    ) -> Result<PreloadOutcome, ApiError> {
        let response = self
            .client
            .post(self.endpoint("preload"))
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?
            .error_for_status()
            .map_err(|e| classify_transport_error(&e))?;

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let parsed: PreloadResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Serialization {
                reason: e.to_string(),
            })?;

        tracing::debug!(
            bids = parsed.bids.as_ref().map(Vec::len).unwrap_or(0),
            err_code = ?parsed.err_code,
            "Preload response received"
        );

        parsed.into_outcome()
    }

    async fn report_error(&self, report: &ErrorReport) -> Result<(), ApiError> {
        self.client
            .post(self.endpoint("error"))
            .json(report)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?
            .error_for_status()
            .map_err(|e| classify_transport_error(&e))?;
        Ok(())
    }
}
