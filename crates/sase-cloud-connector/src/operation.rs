//! Long-running operation handles

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{DeploymentSnapshot, DeploymentState};
use crate::CloudResult;

/// Asynchronous cloud operation (deployment, group deletion)
#[async_trait]
pub trait Operation<T: Send>: Send {
    /// Whether the operation was terminal at the last status check
    fn is_done(&self) -> bool;

    /// Block for up to `timeout` while the operation runs. Returns early once done.
    async fn wait(&mut self, timeout: Duration) -> CloudResult<()>;

    /// Final value, waiting up to `timeout` for completion
    async fn result(&mut self, timeout: Duration) -> CloudResult<T>;
}

/// Deployment accepted by the cloud, still running
pub struct DeploymentHandle {
    pub resource_group: String,
    pub deployment_name: String,
    /// Deployment as returned by the submission call
    pub initial: DeploymentSnapshot,
    pub operation: Box<dyn Operation<DeploymentSnapshot>>,
}

impl DeploymentHandle {
    pub fn correlation_id(&self) -> &str {
        &self.initial.correlation_id
    }

    pub fn initial_state(&self) -> &DeploymentState {
        &self.initial.provisioning_state
    }
}

/// Pending resource group deletion
pub struct DeleteHandle {
    pub resource_group: String,
    pub operation: Box<dyn Operation<()>>,
}

impl DeleteHandle {
    /// Wait up to `timeout` for the group to be gone
    pub async fn wait_deleted(mut self, timeout: Duration) -> CloudResult<()> {
        self.operation.result(timeout).await
    }
}
