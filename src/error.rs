//! Error taxonomy for inspection runs
//!
//! Every failure surfaced to the driver is one of the variants below. Each
//! carries the URL, address, or container reference it originated from so a
//! per-image report can say exactly what failed and where.

use crate::config::ConfigError;
use crate::inspector::os::InspectorOs;
use std::time::Duration;
use thiserror::Error;

/// Classified failure of one inspection step
#[derive(Debug, Clone, Error)]
pub enum InspectorError {
    /// The inspector container could not be created or started
    #[error("Failed to start {os} inspector service ({container}): {message}")]
    ServiceStartFailure {
        os: InspectorOs,
        container: String,
        message: String,
    },

    /// Health checks never reported ready before the deadline
    #[error(
        "Inspector service at {address} was not ready after {:.1}s (timeout {:.1}s)",
        elapsed.as_secs_f64(),
        deadline.as_secs_f64()
    )]
    ServiceTimeout {
        address: String,
        elapsed: Duration,
        deadline: Duration,
    },

    /// Transport failure (connect, reset, or response timeout)
    #[error("Inspector service unreachable at {url}: {message}")]
    ServiceUnreachable {
        url: String,
        message: String,
        timed_out: bool,
        /// No connection was made, so the service never saw the request
        connect_failed: bool,
    },

    /// 2xx response whose body is not a valid extraction payload
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse {
        url: String,
        message: String,
        body: String,
    },

    /// Non-2xx response to an extraction request
    #[error("Extraction request {url} rejected with HTTP {status_code}: {body}")]
    ExtractionRejected {
        url: String,
        status_code: u16,
        body: String,
    },

    /// Configuration is missing or inconsistent; raised before any container or network action
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The generated artifact could not be persisted
    #[error("Failed to write artifact {path}: {message}")]
    ArtifactWrite { path: String, message: String },
}

impl InspectorError {
    /// Short classification label used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            InspectorError::ServiceStartFailure { .. } => "ServiceStartFailure",
            InspectorError::ServiceTimeout { .. } => "ServiceTimeout",
            InspectorError::ServiceUnreachable { .. } => "ServiceUnreachable",
            InspectorError::MalformedResponse { .. } => "MalformedResponse",
            InspectorError::ExtractionRejected { .. } => "ExtractionRejected",
            InspectorError::InvalidConfiguration(_) => "InvalidConfiguration",
            InspectorError::ArtifactWrite { .. } => "ArtifactWrite",
        }
    }

    /// Whether the request never reached the service, so sending it again
    /// cannot repeat work the service already did
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InspectorError::ServiceUnreachable {
                connect_failed: true,
                ..
            }
        )
    }

    /// The URL or address the failure originated from, when there is one
    pub fn origin(&self) -> Option<&str> {
        match self {
            InspectorError::ServiceStartFailure { container, .. } => Some(container),
            InspectorError::ServiceTimeout { address, .. } => Some(address),
            InspectorError::ServiceUnreachable { url, .. }
            | InspectorError::MalformedResponse { url, .. }
            | InspectorError::ExtractionRejected { url, .. } => Some(url),
            InspectorError::ArtifactWrite { path, .. } => Some(path),
            InspectorError::InvalidConfiguration(_) => None,
        }
    }
}

impl From<ConfigError> for InspectorError {
    fn from(err: ConfigError) -> Self {
        InspectorError::InvalidConfiguration(err.to_string())
    }
}
