//! Management system collaborator interface
//!
//! Everything the provisioning flow needs from the SMC, expressed as one
//! trait so the HTTP client and the in-memory system are interchangeable.
//! All calls except `login` assume an open session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::SmcResult;

/// Reference to an SMC element (engine, node, policy, location)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub name: String,
    pub href: String,
}

impl ElementRef {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self { name: name.into(), href: href.into() }
    }
}

/// Single-node layer 3 firewall with a DHCP-addressed interface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DynamicEngineSpec {
    pub name: String,
    pub interface_id: u32,
    pub dynamic_index: u32,
    pub default_nat: bool,
    pub location: Option<ElementRef>,
}

impl DynamicEngineSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interface_id: 0,
            dynamic_index: 1,
            default_nat: false,
            location: None,
        }
    }

    pub fn with_location(mut self, location: ElementRef) -> Self {
        self.location = Some(location);
        self
    }
}

/// Snapshot of a policy upload task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub progress: u8,
    pub in_progress: bool,
    pub success: bool,
    pub last_message: String,
}

#[async_trait]
pub trait ManagementSystem: Send + Sync {
    /// Open the API session
    async fn login(&self) -> SmcResult<()>;

    /// Close the API session
    async fn logout(&self) -> SmcResult<()>;

    /// Find a location by name, creating it when missing
    async fn resolve_location(&self, name: &str) -> SmcResult<ElementRef>;

    async fn create_dynamic_engine(&self, spec: &DynamicEngineSpec) -> SmcResult<ElementRef>;

    async fn find_engine(&self, name: &str) -> SmcResult<Option<ElementRef>>;

    /// Remove an engine. `SmcError::NotFound` when already gone,
    /// `SmcError::DeleteFailed` when the SMC refuses.
    async fn delete_engine(&self, engine: &ElementRef) -> SmcResult<()>;

    /// Set `dynamic_classid` on every routing node under the interface.
    /// Returns how many routing entries were updated.
    async fn classify_routes(&self, engine: &ElementRef, interface_id: u32, classid: &str) -> SmcResult<usize>;

    async fn primary_node(&self, engine: &ElementRef) -> SmcResult<ElementRef>;

    async fn bind_license(&self, node: &ElementRef) -> SmcResult<()>;

    /// Raw initial contact configuration for the node
    async fn initial_contact(&self, node: &ElementRef) -> SmcResult<Vec<u8>>;

    async fn get_or_create_policy(&self, name: &str) -> SmcResult<ElementRef>;

    /// Start a policy upload, returning the task follower
    async fn upload_policy(&self, policy: &ElementRef, engine_name: &str) -> SmcResult<ElementRef>;

    async fn task_progress(&self, task: &ElementRef) -> SmcResult<TaskProgress>;
}
