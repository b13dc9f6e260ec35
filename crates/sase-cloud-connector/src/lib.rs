//! OpenSASE Cloud Connector (OSCC)
//!
//! Azure Resource Manager side of NGFW provisioning: resource groups,
//! template deployments, long-running operations and discovery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Cloud Connector Architecture                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ┌──────────────────────┐      ┌──────────────────────┐        │
//! │   │  CloudOrchestrator   │      │      Discovery       │        │
//! │   │ groups, deployments, │      │ by tag / all / group │        │
//! │   │  bounded poll loop   │◄─────┤     / locations      │        │
//! │   └──────────┬───────────┘      └──────────────────────┘        │
//! │              │ ResourceManager + Operation<T>                   │
//! │      ┌───────┴──────────┐                                       │
//! │      ▼                  ▼                                       │
//! │  ┌─────────────┐  ┌──────────────────┐                          │
//! │  │ AzureClient │  │ InMemory (tests) │                          │
//! │  └──────┬──────┘  └──────────────────┘                          │
//! │         │ TokenCache ◄── CredentialChain                        │
//! │         ▼                                                       │
//! │   management.azure.com                                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod azure;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod manager;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod operation;
pub mod orchestrator;
pub mod types;

pub use azure::{ArmConfig, AzureClient};
pub use credentials::{
    AzureCredentials, CredentialChain, CredentialProvider, Environment, ServicePrincipalProvider,
    UserPasswordProvider,
};
pub use discovery::{Discovered, Discovery, ListMode, DEFAULT_DISCOVERY_TAG};
pub use error::{CloudError, CloudResult};
pub use manager::{ResourceManager, Submission};
pub use operation::{DeleteHandle, DeploymentHandle, Operation};
pub use orchestrator::{CloudOrchestrator, PollPolicy};
pub use types::{
    DeploymentParameters, DeploymentRequest, DeploymentResult, DeploymentSnapshot,
    DeploymentState, GroupFilter, Location, ResourceGroup, ResourceSummary, TemplateSource,
};
