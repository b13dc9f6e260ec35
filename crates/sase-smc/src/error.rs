//! Error types for the SMC client.

use thiserror::Error;

/// Result type alias using `SmcError`.
pub type SmcResult<T> = Result<T, SmcError>;

/// Errors returned by the management system.
#[derive(Debug, Error)]
pub enum SmcError {
    /// Missing or invalid client settings.
    #[error("SMC configuration error: {0}")]
    Config(String),

    /// Login rejected or no session open.
    #[error("SMC authentication error: {0}")]
    Auth(String),

    /// Element lookup found nothing.
    #[error("element not found: {0}")]
    NotFound(String),

    /// Element exists but could not be removed (e.g. still referenced).
    #[error("delete of {name} failed: {message}")]
    DeleteFailed { name: String, message: String },

    /// Element creation was rejected.
    #[error("create of {name} failed: {message}")]
    CreateFailed { name: String, message: String },

    /// Any other non-success API response.
    #[error("SMC API error {status}: {message}")]
    Api { status: u16, message: String },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl SmcError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Engine identity lifecycle errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The management system rejected the engine or its location.
    #[error("engine {name} could not be created: {source}")]
    Creation {
        name: String,
        #[source]
        source: SmcError,
    },

    /// The engine exists but could not be removed.
    #[error("engine {name} could not be deleted: {source}")]
    Deletion {
        name: String,
        #[source]
        source: SmcError,
    },
}

/// Policy assignment errors. Logged by callers, never fatal to provisioning.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy {policy} could not be prepared: {source}")]
    Prepare {
        policy: String,
        #[source]
        source: SmcError,
    },

    #[error("policy {policy} upload to {engine} failed: {message}")]
    Upload {
        policy: String,
        engine: String,
        message: String,
    },

    #[error("policy {policy} upload to {engine} still running after {waited_secs}s")]
    Timeout {
        policy: String,
        engine: String,
        waited_secs: u64,
    },

    #[error("policy upload task error: {0}")]
    Task(#[source] SmcError),
}
