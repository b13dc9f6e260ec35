//! CLI Configuration

use anyhow::Context;
use sase_orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Contents of `~/.opensase/ngfw[.<profile>].toml`
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Missing file means defaults
    pub fn load(profile: Option<&str>) -> anyhow::Result<Self> {
        let path = Self::config_path(profile)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Command-line flags win over the file
    pub fn with_overrides(mut self, deployment_timeout: Option<u64>, poll_interval: Option<u64>) -> Self {
        if let Some(secs) = deployment_timeout {
            self.orchestrator.deployment_timeout_secs = secs;
        }
        if let Some(secs) = poll_interval {
            self.orchestrator.poll_interval_secs = secs;
        }
        self
    }

    fn config_path(profile: Option<&str>) -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot find home directory")?;
        let filename = match profile {
            Some(p) => format!("ngfw.{}.toml", p),
            None => "ngfw.toml".to_string(),
        };
        Ok(home.join(".opensase").join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_orchestrator_table() {
        let config = Config::parse(
            r#"
            [orchestrator]
            deployment_timeout_secs = 900
            tag_key = "ngfw"
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.deployment_timeout_secs, 900);
        assert_eq!(config.orchestrator.tag_key, "ngfw");
        assert_eq!(config.orchestrator.per_poll_timeout_secs, 30);
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::parse("[orchestrator]\npoll_interval_secs = 20\n")
            .unwrap()
            .with_overrides(Some(120), None);
        assert_eq!(config.orchestrator.deployment_timeout_secs, 120);
        assert_eq!(config.orchestrator.poll_interval_secs, 20);
    }

    #[test]
    fn test_unknown_value_type_is_an_error() {
        assert!(Config::parse("[orchestrator]\ndelete_wait_secs = \"soon\"\n").is_err());
    }
}
