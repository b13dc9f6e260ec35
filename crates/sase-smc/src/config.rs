//! SMC connection settings

use std::fmt;
use std::time::Duration;
use url::Url;

use crate::{SmcError, SmcResult};

pub const ENV_ADDRESS: &str = "SMC_ADDRESS";
pub const ENV_API_KEY: &str = "SMC_API_KEY";
pub const ENV_API_VERSION: &str = "SMC_API_VERSION";
pub const ENV_TIMEOUT: &str = "SMC_TIMEOUT";

const DEFAULT_API_VERSION: &str = "6.10";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Management server address and API client key
#[derive(Clone)]
pub struct SmcConfig {
    pub address: Url,
    pub api_key: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl SmcConfig {
    pub fn new(address: &str, api_key: impl Into<String>) -> SmcResult<Self> {
        Ok(Self {
            address: Url::parse(address)?,
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Load from `SMC_ADDRESS`, `SMC_API_KEY` and optional `SMC_API_VERSION` / `SMC_TIMEOUT`.
    pub fn from_env() -> SmcResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> SmcResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = lookup(ENV_ADDRESS)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SmcError::Config(format!("{} is not set", ENV_ADDRESS)))?;
        let api_key = lookup(ENV_API_KEY)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SmcError::Config(format!("{} is not set", ENV_API_KEY)))?;

        let mut config = Self::new(&address, api_key)?;
        if let Some(version) = lookup(ENV_API_VERSION).filter(|v| !v.is_empty()) {
            config.api_version = version;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let secs: u64 = raw
                .parse()
                .map_err(|_| SmcError::Config(format!("{} must be whole seconds, got {:?}", ENV_TIMEOUT, raw)))?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Versioned API root, e.g. `https://smc:8082/6.10/`
    pub fn api_root(&self) -> SmcResult<Url> {
        let mut root = self.address.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        Ok(root.join(&format!("{}/", self.api_version))?)
    }
}

impl fmt::Debug for SmcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmcConfig")
            .field("address", &self.address.as_str())
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}
