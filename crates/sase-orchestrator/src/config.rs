//! Orchestrator tuning
//!
//! All durations are whole seconds so the table reads naturally in a TOML
//! profile file.

use sase_cloud_connector::PollPolicy;
use sase_smc::PolicyUploadConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tag key put on every created resource group
pub const DEFAULT_TAG_KEY: &str = "stonesoft";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Delay between status requests inside the cloud pollers
    pub poll_interval_secs: u64,
    /// Longest single blocking wait on a deployment
    pub per_poll_timeout_secs: u64,
    /// Overall deployment ceiling
    pub deployment_timeout_secs: u64,
    /// Bounded wait on resource group deletion during destroy
    pub delete_wait_secs: u64,
    pub policy_poll_secs: u64,
    pub policy_timeout_secs: u64,
    /// Provenance tag key
    pub tag_key: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            per_poll_timeout_secs: 30,
            deployment_timeout_secs: 60 * 60,
            delete_wait_secs: 10,
            policy_poll_secs: 5,
            policy_timeout_secs: 30 * 60,
            tag_key: DEFAULT_TAG_KEY.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            per_poll_timeout: Duration::from_secs(self.per_poll_timeout_secs.max(1)),
            ceiling: Duration::from_secs(self.deployment_timeout_secs),
        }
    }

    pub fn delete_wait(&self) -> Duration {
        Duration::from_secs(self.delete_wait_secs)
    }

    pub fn policy_upload(&self) -> PolicyUploadConfig {
        PolicyUploadConfig {
            poll_interval: Duration::from_secs(self.policy_poll_secs.max(1)),
            max_wait: Duration::from_secs(self.policy_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert_eq!(config.delete_wait(), Duration::from_secs(10));
        assert_eq!(config.policy_upload().poll_interval, Duration::from_secs(5));
        assert_eq!(config.tag_key, "stonesoft");
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{ "deployment_timeout_secs": 600 }"#).unwrap();
        assert_eq!(config.poll_policy().ceiling, Duration::from_secs(600));
        assert_eq!(config.per_poll_timeout_secs, 30);
    }
}
