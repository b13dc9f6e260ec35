//! Firewall policy assignment

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

use crate::api::{ManagementSystem, TaskProgress};
use crate::PolicyError;

/// Upload polling settings
#[derive(Clone, Debug)]
pub struct PolicyUploadConfig {
    /// Wait between task progress checks
    pub poll_interval: Duration,
    /// Give up waiting on the task after this long
    pub max_wait: Duration,
}

impl Default for PolicyUploadConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(30 * 60),
        }
    }
}

/// Uploads a named firewall policy to an engine
pub struct PolicyApplier<M: ?Sized> {
    smc: Arc<M>,
    config: PolicyUploadConfig,
}

impl<M: ManagementSystem + ?Sized> PolicyApplier<M> {
    pub fn new(smc: Arc<M>, config: PolicyUploadConfig) -> Self {
        Self { smc, config }
    }

    /// Upload `policy_name` to `engine_name` and follow the task to completion.
    ///
    /// A failed upload is logged with the task's last message and returned,
    /// but callers treat it as non-fatal: the engine and its cloud resources
    /// stay in place with the policy left for manual remediation.
    pub async fn apply_policy(&self, engine_name: &str, policy_name: &str) -> Result<TaskProgress, PolicyError> {
        let result = self.upload(engine_name, policy_name).await;
        if let Err(ref e) = result {
            error!("Policy {} was not applied to {}: {}", policy_name, engine_name, e);
        }
        result
    }

    async fn upload(&self, engine_name: &str, policy_name: &str) -> Result<TaskProgress, PolicyError> {
        let policy = self
            .smc
            .get_or_create_policy(policy_name)
            .await
            .map_err(|source| PolicyError::Prepare { policy: policy_name.to_string(), source })?;

        let task = self
            .smc
            .upload_policy(&policy, engine_name)
            .await
            .map_err(|source| PolicyError::Prepare { policy: policy_name.to_string(), source })?;

        let started = Instant::now();
        let status = loop {
            let status = self.smc.task_progress(&task).await.map_err(PolicyError::Task)?;
            info!("Stonesoft NGFW Policy upload task: {}%", status.progress);

            if !status.in_progress {
                break status;
            }
            if started.elapsed() >= self.config.max_wait {
                return Err(PolicyError::Timeout {
                    policy: policy_name.to_string(),
                    engine: engine_name.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            sleep(self.config.poll_interval).await;
        };

        if status.success {
            info!("Policy {} uploaded to {}", policy_name, engine_name);
            Ok(status)
        } else {
            Err(PolicyError::Upload {
                policy: policy_name.to_string(),
                engine: engine_name.to_string(),
                message: status.last_message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryManagementSystem, UploadScript};

    async fn applier(script: UploadScript) -> (Arc<InMemoryManagementSystem>, PolicyApplier<InMemoryManagementSystem>) {
        let smc = Arc::new(InMemoryManagementSystem::new());
        smc.login().await.unwrap();
        smc.script_upload(script);
        let config = PolicyUploadConfig {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
        };
        (smc.clone(), PolicyApplier::new(smc, config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_policy_reports_progress() {
        let (smc, applier) = applier(UploadScript::Succeed { steps: 3 }).await;

        let status = applier.apply_policy("rg1", "_Azure_Default").await.unwrap();
        assert!(status.success);
        assert_eq!(status.progress, 100);
        assert!(smc.policy_exists("_Azure_Default"));
        assert_eq!(smc.task_polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_carries_last_message() {
        let (_smc, applier) = applier(UploadScript::Fail { message: "Engine not initialized".into() }).await;

        match applier.apply_policy("rg1", "Strict").await.unwrap_err() {
            PolicyError::Upload { message, .. } => assert_eq!(message, "Engine not initialized"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_upload_times_out() {
        let (_smc, applier) = applier(UploadScript::Hang).await;

        let err = applier.apply_policy("rg1", "Strict").await.unwrap_err();
        assert!(matches!(err, PolicyError::Timeout { .. }));
    }
}
