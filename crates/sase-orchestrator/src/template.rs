//! Deployment Template Renderer
//!
//! Resolves the template selection into a [`TemplateSource`] and assembles
//! the fixed NGFW parameter set.

use sase_cloud_connector::{DeploymentParameters, TemplateSource};
use sase_smc::BootstrapToken;
use std::path::{Path, PathBuf};
use url::Url;

use crate::{ProvisionError, ProvisionResult};

/// Where the deployment template comes from. Exactly one of path or link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateLocation {
    /// Local JSON document, sent inline
    Path(PathBuf),
    /// Publicly reachable template URI, passed as a link
    Link(Url),
}

impl TemplateLocation {
    pub fn from_args(path: Option<PathBuf>, link: Option<String>) -> ProvisionResult<Self> {
        match (path, link) {
            (Some(path), None) => Ok(Self::Path(path)),
            (None, Some(link)) => Url::parse(&link)
                .map(Self::Link)
                .map_err(|e| ProvisionError::Configuration(format!("invalid template link {}: {}", link, e))),
            (Some(_), Some(_)) => Err(ProvisionError::Configuration(
                "template path and template link are mutually exclusive".into(),
            )),
            (None, None) => Err(ProvisionError::Configuration(
                "one of template path or template link is required".into(),
            )),
        }
    }

    /// Read and parse an inline document; links pass through.
    pub async fn load(&self) -> ProvisionResult<TemplateSource> {
        let source = match self {
            Self::Path(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ProvisionError::Configuration(format!("cannot read template {}: {}", path.display(), e))
                })?;
                let document = serde_json::from_str(&raw).map_err(|e| {
                    ProvisionError::Configuration(format!("template {} is not valid JSON: {}", path.display(), e))
                })?;
                TemplateSource::Inline(document)
            }
            Self::Link(url) => TemplateSource::Link(url.clone()),
        };
        source
            .validate()
            .map_err(|e| ProvisionError::Configuration(e.to_string()))?;
        Ok(source)
    }
}

/// `~/.ssh/id_rsa.pub`
pub fn default_ssh_key_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa.pub"))
}

/// Public key text, trimmed
pub async fn read_ssh_public_key(path: &Path) -> ProvisionResult<String> {
    let key = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProvisionError::Configuration(format!("cannot read SSH key {}: {}", path.display(), e)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ProvisionError::Configuration(format!("SSH key {} is empty", path.display())));
    }
    Ok(key.to_string())
}

/// Template parameters for one engine
pub fn render_parameters(token: &BootstrapToken, engine_username: &str, ssh_key: &str) -> DeploymentParameters {
    DeploymentParameters {
        engine_cfg: token.as_str().to_string(),
        engine_username: engine_username.to_string(),
        ssh_key: ssh_key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ngfw-template-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_exactly_one_source() {
        assert!(matches!(
            TemplateLocation::from_args(Some("engine.json".into()), None),
            Ok(TemplateLocation::Path(_))
        ));
        assert!(matches!(
            TemplateLocation::from_args(None, Some("https://example.com/azuredeploy.json".into())),
            Ok(TemplateLocation::Link(_))
        ));
        assert!(matches!(
            TemplateLocation::from_args(Some("engine.json".into()), Some("https://example.com/t.json".into())),
            Err(ProvisionError::Configuration(_))
        ));
        assert!(matches!(
            TemplateLocation::from_args(None, None),
            Err(ProvisionError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_load_inline_document() {
        let path = scratch("engine.json");
        std::fs::write(&path, r#"{ "$schema": "deploymentTemplate", "resources": [] }"#).unwrap();

        let source = TemplateLocation::Path(path.clone()).load().await.unwrap();
        assert!(matches!(source, TemplateSource::Inline(ref doc) if doc["resources"].is_array()));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_or_invalid_template() {
        let missing = TemplateLocation::Path(scratch("missing.json"));
        assert!(matches!(missing.load().await, Err(ProvisionError::Configuration(_))));

        let path = scratch("broken.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            TemplateLocation::Path(path.clone()).load().await,
            Err(ProvisionError::Configuration(_))
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_ssh_key_is_trimmed() {
        let path = scratch("id_rsa.pub");
        std::fs::write(&path, "ssh-rsa AAAAB3Nza alice@host\n").unwrap();
        let key = tokio_test::block_on(read_ssh_public_key(&path));
        assert_eq!(tokio_test::assert_ok!(key), "ssh-rsa AAAAB3Nza alice@host");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_render_parameters() {
        let token = BootstrapToken::from_initial_contact(b"cfg");
        let params = render_parameters(&token, "alice", "ssh-rsa AAAA");
        assert_eq!(params.engine_cfg, token.as_str());
        assert_eq!(params.engine_username, "alice");
    }
}
