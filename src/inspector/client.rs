//! HTTP client for the inspector service
//!
//! Transport failures become [`InspectorError::ServiceUnreachable`], non-2xx
//! extraction responses [`InspectorError::ExtractionRejected`], and 2xx bodies
//! that do not parse [`InspectorError::MalformedResponse`]. Nothing here
//! retries; readiness polling is the lifecycle manager's job.

use super::request::{endpoint_url, extraction_url, ExtractionRequest, HEALTH_ENDPOINT};
use crate::error::InspectorError;
use crate::extract::ExtractionPayload;
use crate::util::logging::current_level_name;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::{Duration, Instant};
use tracing::{debug, error};

const UP_MARKER: &str = "UP";

/// Result of one health request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub http_status: u16,
    /// Status marker found in the body, if any
    pub status: Option<String>,
}

impl HealthStatus {
    /// Parses a health body: a JSON object with a `status` field, or a bare marker
    pub fn from_body(http_status: u16, body: &str) -> Self {
        let status = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(str::to_string))
            .or_else(|| {
                let trimmed = body.trim();
                trimmed
                    .eq_ignore_ascii_case(UP_MARKER)
                    .then(|| trimmed.to_string())
            });
        Self {
            http_status,
            status,
        }
    }

    pub fn is_up(&self) -> bool {
        (200..300).contains(&self.http_status)
            && self
                .status
                .as_deref()
                .map_or(false, |s| s.eq_ignore_ascii_case(UP_MARKER))
    }
}

/// A successful extraction call
#[derive(Debug, Clone)]
pub struct ExtractionResponse {
    pub url: String,
    /// Kept for diagnostics
    pub raw_body: String,
    pub payload: ExtractionPayload,
}

#[async_trait]
pub trait InspectorApi: Send + Sync {
    async fn health_check(&self, base_url: &str) -> Result<HealthStatus, InspectorError>;

    async fn request_extraction(
        &self,
        base_url: &str,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, InspectorError>;
}

/// [`InspectorApi`] over HTTP
pub struct ImageInspectorClient {
    client: Client,
}

impl ImageInspectorClient {
    /// Every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, InspectorError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            InspectorError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &Url) -> Result<(u16, String), InspectorError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unreachable(url, &e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| unreachable(url, &e))?;
        Ok((status, body))
    }
}

fn unreachable(url: &Url, err: &reqwest::Error) -> InspectorError {
    InspectorError::ServiceUnreachable {
        url: url.to_string(),
        message: err.to_string(),
        timed_out: err.is_timeout(),
        connect_failed: err.is_connect(),
    }
}

#[async_trait]
impl InspectorApi for ImageInspectorClient {
    async fn health_check(&self, base_url: &str) -> Result<HealthStatus, InspectorError> {
        let url = endpoint_url(base_url, HEALTH_ENDPOINT)?;
        let (status, body) = self.get(&url).await?;
        let health = HealthStatus::from_body(status, &body);
        debug!(url = %url, http_status = status, status = ?health.status, "Health check");
        Ok(health)
    }

    async fn request_extraction(
        &self,
        base_url: &str,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, InspectorError> {
        let url = extraction_url(base_url, request, &current_level_name())?;
        debug!(url = %url, "Requesting extraction");

        let start = Instant::now();
        let (status, body) = self.get(&url).await?;
        debug!(
            url = %url,
            http_status = status,
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction response received"
        );

        if !(200..300).contains(&status) {
            error!(url = %url, http_status = status, "Extraction request rejected");
            return Err(InspectorError::ExtractionRejected {
                url: url.to_string(),
                status_code: status,
                body,
            });
        }

        let payload = serde_json::from_str::<ExtractionPayload>(&body).map_err(|e| {
            InspectorError::MalformedResponse {
                url: url.to_string(),
                message: e.to_string(),
                body: body.clone(),
            }
        })?;

        Ok(ExtractionResponse {
            url: url.to_string(),
            raw_body: body,
            payload,
        })
    }
}
