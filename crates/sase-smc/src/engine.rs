//! Engine Identity Management
//!
//! The engine identity is the NGFW as the SMC sees it. Its name is the
//! Azure resource group name, which is the only link between the two systems.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{DynamicEngineSpec, ElementRef, ManagementSystem};
use crate::{IdentityError, SmcError, SmcResult};

/// Routing classifier so the cloud default route resolves once deployed
pub const GATEWAY_CLASSID: &str = "gateway";

/// License binding state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseState {
    Unbound,
    Bound,
}

/// Base64 initial contact configuration, consumed by the deployment parameters
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapToken(String);

impl BootstrapToken {
    pub fn from_initial_contact(raw: &[u8]) -> Self {
        Self(STANDARD.encode(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for BootstrapToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BootstrapToken({} bytes)", self.0.len())
    }
}

/// Engine identity created for one resource group
#[derive(Debug)]
pub struct EngineIdentity {
    pub name: String,
    pub element: ElementRef,
    pub location: Option<String>,
    pub license: LicenseState,
    pub bootstrap_token: BootstrapToken,
}

/// Result of an idempotent delete
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    NotFound,
}

/// Creates and removes engine identities
pub struct EngineIdentityManager<M: ?Sized> {
    smc: Arc<M>,
}

impl<M: ManagementSystem + ?Sized> EngineIdentityManager<M> {
    pub fn new(smc: Arc<M>) -> Self {
        Self { smc }
    }

    /// Create a dynamic engine, mark its gateway route, bind the license and
    /// return the identity with its bootstrap token.
    pub async fn create_identity(&self, name: &str, location: Option<&str>) -> Result<EngineIdentity, IdentityError> {
        let creation = |source: SmcError| IdentityError::Creation { name: name.to_string(), source };

        let mut spec = DynamicEngineSpec::new(name);
        if let Some(location) = location {
            spec = spec.with_location(self.smc.resolve_location(location).await.map_err(creation)?);
        }

        let element = self.smc.create_dynamic_engine(&spec).await.map_err(creation)?;
        info!("Created engine {} ({})", name, element.href);

        match self.finish_identity(&element, spec.interface_id).await {
            Ok(token) => Ok(EngineIdentity {
                name: name.to_string(),
                element,
                location: location.map(str::to_string),
                license: LicenseState::Bound,
                bootstrap_token: token,
            }),
            Err(e) => {
                // Do not leave a half-configured engine behind
                if let Err(cleanup) = self.smc.delete_engine(&element).await {
                    warn!("Could not remove partially created engine {}: {}", name, cleanup);
                }
                Err(creation(e))
            }
        }
    }

    async fn finish_identity(&self, engine: &ElementRef, interface_id: u32) -> SmcResult<BootstrapToken> {
        let routes = self.smc.classify_routes(engine, interface_id, GATEWAY_CLASSID).await?;
        info!("Marked {} routing entries on interface {} as {}", routes, interface_id, GATEWAY_CLASSID);

        let node = self.smc.primary_node(engine).await?;
        self.smc.bind_license(&node).await?;
        info!("License bound to {}", node.name);

        let raw = self.smc.initial_contact(&node).await?;
        Ok(BootstrapToken::from_initial_contact(&raw))
    }

    /// Delete the engine by name. A missing engine is not an error.
    pub async fn delete_identity(&self, name: &str) -> Result<Deletion, IdentityError> {
        let deletion = |source: SmcError| IdentityError::Deletion { name: name.to_string(), source };

        let engine = match self.smc.find_engine(name).await.map_err(deletion)? {
            Some(engine) => engine,
            None => return Ok(Deletion::NotFound),
        };

        match self.smc.delete_engine(&engine).await {
            Ok(()) => {
                info!("Deleted engine {}", name);
                Ok(Deletion::Deleted)
            }
            Err(SmcError::NotFound(_)) => Ok(Deletion::NotFound),
            Err(e) => Err(deletion(e)),
        }
    }

    /// Remove any stale engine with this name, then create it fresh.
    /// Failure to remove the stale engine is logged and creation proceeds.
    pub async fn force_replace(&self, name: &str, location: Option<&str>) -> Result<EngineIdentity, IdentityError> {
        match self.delete_identity(name).await {
            Ok(Deletion::Deleted) => info!("Removed stale engine {}", name),
            Ok(Deletion::NotFound) => {}
            Err(e) => warn!("Force remove of {} failed: {}", name, e),
        }
        self.create_identity(name, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryManagementSystem;

    async fn manager() -> (Arc<InMemoryManagementSystem>, EngineIdentityManager<InMemoryManagementSystem>) {
        let smc = Arc::new(InMemoryManagementSystem::new());
        smc.login().await.unwrap();
        (smc.clone(), EngineIdentityManager::new(smc))
    }

    #[tokio::test]
    async fn test_create_identity() {
        let (smc, manager) = manager().await;

        let identity = manager.create_identity("rg1", Some("Internet")).await.unwrap();

        assert_eq!(identity.name, "rg1");
        assert_eq!(identity.license, LicenseState::Bound);
        assert_eq!(identity.location.as_deref(), Some("Internet"));
        assert_eq!(
            identity.bootstrap_token.as_str(),
            STANDARD.encode(InMemoryManagementSystem::initial_contact_for("rg1"))
        );
        assert!(smc.engine_exists("rg1"));
        assert_eq!(smc.gateway_routes("rg1"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_creation_error() {
        let (_smc, manager) = manager().await;
        manager.create_identity("rg1", None).await.unwrap();

        let err = manager.create_identity("rg1", None).await.unwrap_err();
        assert!(matches!(err, IdentityError::Creation { .. }));
    }

    #[tokio::test]
    async fn test_failed_license_removes_engine() {
        let (smc, manager) = manager().await;
        smc.fail_license_binding();

        let err = manager.create_identity("rg1", None).await.unwrap_err();
        assert!(matches!(err, IdentityError::Creation { .. }));
        assert!(!smc.engine_exists("rg1"));
    }

    #[tokio::test]
    async fn test_delete_missing_identity_is_silent() {
        let (_smc, manager) = manager().await;
        assert_eq!(manager.delete_identity("ghost").await.unwrap(), Deletion::NotFound);
    }

    #[tokio::test]
    async fn test_delete_referenced_identity_fails() {
        let (smc, manager) = manager().await;
        manager.create_identity("rg1", None).await.unwrap();
        smc.mark_referenced("rg1");

        let err = manager.delete_identity("rg1").await.unwrap_err();
        assert!(matches!(err, IdentityError::Deletion { .. }));
        assert!(smc.engine_exists("rg1"));
    }

    #[tokio::test]
    async fn test_force_replace() {
        let (smc, manager) = manager().await;
        let first = manager.create_identity("rg1", None).await.unwrap();

        let second = manager.force_replace("rg1", None).await.unwrap();
        assert_ne!(first.element.href, second.element.href);
        assert_eq!(smc.delete_calls("rg1"), 1);
    }

    #[test]
    fn test_token_debug_hides_content() {
        let token = BootstrapToken::from_initial_contact(b"secret config");
        assert!(!format!("{:?}", token).contains(token.as_str()));
    }
}
