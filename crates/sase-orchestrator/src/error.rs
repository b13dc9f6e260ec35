//! Provisioning error taxonomy

use sase_cloud_connector::CloudError;
use sase_smc::{IdentityError, SmcError};
use thiserror::Error;

/// Result type alias using `ProvisionError`.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Missing credentials, bad template selection, unreadable files.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Engine identity could not be created; nothing was provisioned.
    #[error(transparent)]
    IdentityCreation(IdentityError),

    #[error(transparent)]
    IdentityDeletion(IdentityError),

    /// Cloud-side failure during group creation, submission or polling.
    #[error("Cloud provisioning failed: {0}")]
    CloudProvisioning(#[source] CloudError),

    /// Deployment did not reach a terminal state within the ceiling.
    #[error("Timed out: {0}")]
    Timeout(#[source] CloudError),

    /// SMC login failed.
    #[error("SMC session error: {0}")]
    Session(#[source] SmcError),
}

impl ProvisionError {
    /// Cloud failures roll back the engine identity
    pub fn triggers_rollback(&self) -> bool {
        matches!(self, Self::CloudProvisioning(_) | Self::Timeout(_))
    }
}

impl From<CloudError> for ProvisionError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Configuration(msg) => Self::Configuration(msg),
            e if e.is_timeout() => Self::Timeout(e),
            e => Self::CloudProvisioning(e),
        }
    }
}
