//! NGFW Provisioning Orchestrator
//!
//! Provisions a Stonesoft NGFW engine into Azure and tears it down again:
//! - Engine identity, license and bootstrap token in the SMC
//! - Resource group and template deployment in Azure
//! - Optional policy upload once the deployment succeeded
//! - Compensation of the engine identity when the cloud side fails
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     PROVISIONING ORCHESTRATOR                       │
//! │                                                                     │
//! │   create:  Identity ──► Deploy ──► Poll ──► Policy (non-fatal)      │
//! │               ▲           │         │                               │
//! │               └── compensate ◄──────┘  (delete engine identity)     │
//! │                                                                     │
//! │   destroy: delete resource group ─┬─► delete engine identity        │
//! │                                   └─► bounded wait on group delete  │
//! │                                                                     │
//! │  ┌──────────────────────┐              ┌──────────────────────┐     │
//! │  │       sase-smc       │              │ sase-cloud-connector │     │
//! │  │  ManagementSystem    │              │   ResourceManager    │     │
//! │  └──────────────────────┘              └──────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod provisioner;
pub mod saga;
pub mod template;

pub use config::{OrchestratorConfig, DEFAULT_TAG_KEY};
pub use error::{ProvisionError, ProvisionResult};
pub use provisioner::{
    CreateOutcome, CreateRequest, DestroyOutcome, GroupDeletion, IdentityCleanup, PolicyOutcome,
    Provisioner, DEFAULT_DEPLOYMENT_NAME, DEFAULT_LOCATION, DEFAULT_POLICY,
    DEFAULT_TAG_VALUE,
};
pub use saga::{Saga, SagaExecution, SagaStatus, SagaStep, SagaStepExecutor, StepStatus};
pub use template::{default_ssh_key_path, read_ssh_public_key, render_parameters, TemplateLocation};
