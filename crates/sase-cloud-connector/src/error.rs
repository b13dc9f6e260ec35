//! Error types for the cloud connector.

use std::time::Duration;
use thiserror::Error;

use crate::types::DeploymentState;

/// Result type alias using `CloudError`.
pub type CloudResult<T> = Result<T, CloudError>;

#[derive(Debug, Error)]
pub enum CloudError {
    /// Missing credentials or settings. Fatal before any provisioning.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Token acquisition failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Request rejected before it was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource Manager error response.
    #[error("Azure error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Deployment reached a terminal state other than `Succeeded`.
    #[error("deployment {deployment} ended {state}: {message}")]
    DeploymentFailed {
        deployment: String,
        state: DeploymentState,
        message: String,
    },

    /// Operation did not finish within the allowed time.
    #[error("{operation} did not complete within {waited:?}")]
    Timeout { operation: String, waited: Duration },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl CloudError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
