//! Provisioning Orchestrator
//!
//! `create` runs the identity → deploy → poll → policy saga inside one SMC
//! session. Cloud failures compensate by deleting the engine identity; the
//! resource group is left in place for inspection. `destroy` is best-effort
//! and never fails.

use async_trait::async_trait;
use sase_cloud_connector::{
    CloudOrchestrator, DeploymentHandle, DeploymentRequest, DeploymentResult, PollPolicy,
    ResourceManager, TemplateSource,
};
use sase_smc::{Deletion, EngineIdentity, EngineIdentityManager, ManagementSystem, PolicyApplier};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::saga::{Saga, SagaExecution, SagaStatus, SagaStepExecutor};
use crate::template::{render_parameters, TemplateLocation};
use crate::{OrchestratorConfig, ProvisionError, ProvisionResult};

pub const DEFAULT_DEPLOYMENT_NAME: &str = "ngfw_azure_deployment";
pub const DEFAULT_LOCATION: &str = "westus";
pub const DEFAULT_TAG_VALUE: &str = "smc-python";
/// Policy the CLI uploads unless told otherwise
pub const DEFAULT_POLICY: &str = "_Azure_Default";

// =============================================================================
// Requests and outcomes
// =============================================================================

/// Inputs of one create run. The resource group name doubles as the engine name.
#[derive(Clone, Debug)]
pub struct CreateRequest {
    pub resource_group: String,
    pub location: String,
    pub deployment_name: String,
    pub template: TemplateLocation,
    pub engine_username: String,
    pub ssh_public_key: String,
    /// Value of the provenance tag
    pub tag_value: String,
    pub policy: Option<String>,
    /// SMC location element for the engine
    pub engine_location: Option<String>,
    /// Delete a stale engine of the same name first
    pub force_remove: bool,
}

impl CreateRequest {
    pub fn new(
        resource_group: impl Into<String>,
        engine_username: impl Into<String>,
        template: TemplateLocation,
        ssh_public_key: impl Into<String>,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            location: DEFAULT_LOCATION.into(),
            deployment_name: DEFAULT_DEPLOYMENT_NAME.into(),
            template,
            engine_username: engine_username.into(),
            ssh_public_key: ssh_public_key.into(),
            tag_value: DEFAULT_TAG_VALUE.into(),
            policy: None,
            engine_location: None,
            force_remove: false,
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    pub fn with_force_remove(mut self, force_remove: bool) -> Self {
        self.force_remove = force_remove;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PolicyOutcome {
    NotRequested,
    Applied { policy: String },
    /// Left for manual remediation
    Failed { policy: String, message: String },
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub engine: String,
    pub deployment: DeploymentResult,
    pub policy: PolicyOutcome,
    pub execution: SagaExecution,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupDeletion {
    /// Nothing to delete
    Absent,
    Deleted,
    /// Still deleting when the bounded wait ended
    InProgress,
    Failed(String),
}

impl fmt::Display for GroupDeletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Deleted => f.write_str("deleted"),
            Self::InProgress => f.write_str("deletion in progress"),
            Self::Failed(msg) => write!(f, "deletion failed: {}", msg),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityCleanup {
    Deleted,
    NotFound,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestroyOutcome {
    pub resource_group: String,
    pub group: GroupDeletion,
    /// `None` when the group was absent and nothing else was attempted
    pub identity: Option<IdentityCleanup>,
}

impl DestroyOutcome {
    pub fn is_clean(&self) -> bool {
        !matches!(self.group, GroupDeletion::Failed(_))
            && !matches!(self.identity, Some(IdentityCleanup::Failed(_)))
    }
}

// =============================================================================
// Create saga steps
// =============================================================================

struct CreateContext {
    request: CreateRequest,
    template: TemplateSource,
    identity: Option<EngineIdentity>,
    handle: Option<DeploymentHandle>,
    result: Option<DeploymentResult>,
    policy: PolicyOutcome,
}

fn missing(what: &str) -> ProvisionError {
    ProvisionError::Configuration(format!("{} was not produced by an earlier step", what))
}

struct IdentityStep<M: ?Sized> {
    identities: EngineIdentityManager<M>,
}

#[async_trait]
impl<M: ManagementSystem + ?Sized + 'static> SagaStepExecutor<CreateContext> for IdentityStep<M> {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn service(&self) -> &'static str {
        "smc"
    }

    async fn execute(&self, ctx: &mut CreateContext) -> ProvisionResult<Option<Value>> {
        let name = ctx.request.resource_group.clone();
        let location = ctx.request.engine_location.clone();

        let created = if ctx.request.force_remove {
            self.identities.force_replace(&name, location.as_deref()).await
        } else {
            self.identities.create_identity(&name, location.as_deref()).await
        };
        let identity = created.map_err(ProvisionError::IdentityCreation)?;
        info!("Engine identity {} created with license {:?}", identity.name, identity.license);

        let output = json!({ "engine": identity.name, "href": identity.element.href });
        ctx.identity = Some(identity);
        Ok(Some(output))
    }

    async fn compensate(&self, ctx: &mut CreateContext) -> ProvisionResult<()> {
        let Some(identity) = ctx.identity.take() else {
            return Ok(());
        };
        match self.identities.delete_identity(&identity.name).await {
            Ok(Deletion::Deleted) => info!("Rolled back engine identity {}", identity.name),
            Ok(Deletion::NotFound) => warn!("Engine identity {} was already gone", identity.name),
            Err(e) => return Err(ProvisionError::IdentityDeletion(e)),
        }
        Ok(())
    }
}

struct DeployStep<R: ?Sized> {
    cloud: CloudOrchestrator<R>,
    tag_key: String,
}

#[async_trait]
impl<R: ResourceManager + ?Sized + 'static> SagaStepExecutor<CreateContext> for DeployStep<R> {
    fn name(&self) -> &'static str {
        "deploy"
    }

    fn service(&self) -> &'static str {
        "azure"
    }

    async fn execute(&self, ctx: &mut CreateContext) -> ProvisionResult<Option<Value>> {
        let identity = ctx.identity.as_ref().ok_or_else(|| missing("engine identity"))?;
        let request = &ctx.request;
        let parameters = render_parameters(
            &identity.bootstrap_token,
            &request.engine_username,
            &request.ssh_public_key,
        );

        let tags = HashMap::from([(self.tag_key.clone(), request.tag_value.clone())]);
        self.cloud
            .ensure_resource_group(&request.resource_group, &request.location, &tags)
            .await?;

        let deployment = DeploymentRequest {
            resource_group: request.resource_group.clone(),
            deployment_name: request.deployment_name.clone(),
            location: request.location.clone(),
            template: ctx.template.clone(),
            parameters,
        };
        let handle = self.cloud.submit_deployment(&deployment).await?;

        let output = json!({
            "correlation_id": handle.correlation_id(),
            "state": handle.initial_state().as_str(),
        });
        ctx.handle = Some(handle);
        Ok(Some(output))
    }
}

struct PollStep<R: ?Sized> {
    cloud: CloudOrchestrator<R>,
    policy: PollPolicy,
}

#[async_trait]
impl<R: ResourceManager + ?Sized + 'static> SagaStepExecutor<CreateContext> for PollStep<R> {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn service(&self) -> &'static str {
        "azure"
    }

    async fn execute(&self, ctx: &mut CreateContext) -> ProvisionResult<Option<Value>> {
        let handle = ctx.handle.as_mut().ok_or_else(|| missing("deployment handle"))?;
        let result = self.cloud.await_terminal(handle, &self.policy).await?.into_success()?;

        let output = json!({
            "state": result.state.as_str(),
            "elapsed_secs": result.elapsed_secs(),
        });
        ctx.result = Some(result);
        Ok(Some(output))
    }
}

/// Never fails: an upload error is recorded in the context and logged
struct PolicyStep<M: ?Sized> {
    applier: PolicyApplier<M>,
    policy: String,
}

#[async_trait]
impl<M: ManagementSystem + ?Sized + 'static> SagaStepExecutor<CreateContext> for PolicyStep<M> {
    fn name(&self) -> &'static str {
        "policy"
    }

    fn service(&self) -> &'static str {
        "smc"
    }

    async fn execute(&self, ctx: &mut CreateContext) -> ProvisionResult<Option<Value>> {
        let engine = ctx.request.resource_group.clone();
        ctx.policy = match self.applier.apply_policy(&engine, &self.policy).await {
            Ok(task) => {
                info!("Policy {} applied to {} ({}%)", self.policy, engine, task.progress);
                PolicyOutcome::Applied { policy: self.policy.clone() }
            }
            Err(e) => {
                warn!("Continuing without policy {} on {}", self.policy, engine);
                PolicyOutcome::Failed {
                    policy: self.policy.clone(),
                    message: e.to_string(),
                }
            }
        };
        Ok(serde_json::to_value(&ctx.policy).ok())
    }
}

// =============================================================================
// Provisioner
// =============================================================================

/// Drives the create and destroy flows across the SMC and Azure
pub struct Provisioner<M: ?Sized, R: ?Sized> {
    smc: Arc<M>,
    cloud: CloudOrchestrator<R>,
    config: OrchestratorConfig,
}

impl<M, R> Provisioner<M, R>
where
    M: ManagementSystem + ?Sized + 'static,
    R: ResourceManager + ?Sized + 'static,
{
    pub fn new(smc: Arc<M>, cloud: CloudOrchestrator<R>, config: OrchestratorConfig) -> Self {
        Self { smc, cloud, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn create_saga(&self, request: &CreateRequest) -> Saga<CreateContext> {
        let saga = Saga::new("ngfw_create")
            .step(IdentityStep {
                identities: EngineIdentityManager::new(Arc::clone(&self.smc)),
            })
            .step(DeployStep {
                cloud: self.cloud.clone(),
                tag_key: self.config.tag_key.clone(),
            })
            .step(PollStep {
                cloud: self.cloud.clone(),
                policy: self.config.poll_policy(),
            });

        match &request.policy {
            Some(policy) => saga.step(PolicyStep {
                applier: PolicyApplier::new(Arc::clone(&self.smc), self.config.policy_upload()),
                policy: policy.clone(),
            }),
            None => saga,
        }
    }

    /// Provision an engine and its cloud deployment.
    ///
    /// The template is resolved before anything remote is touched. The SMC
    /// session is opened once and closed on every exit path.
    #[instrument(skip(self, request), fields(resource_group = %request.resource_group))]
    pub async fn create(&self, request: CreateRequest) -> ProvisionResult<CreateOutcome> {
        let template = request.template.load().await?;

        self.smc.login().await.map_err(ProvisionError::Session)?;
        let outcome = self.run_create(request, template).await;
        self.close_session().await;
        outcome
    }

    async fn run_create(&self, request: CreateRequest, template: TemplateSource) -> ProvisionResult<CreateOutcome> {
        let saga = self.create_saga(&request);
        let mut execution = SagaExecution::new(
            saga.saga_type(),
            json!({
                "resource_group": request.resource_group,
                "deployment_name": request.deployment_name,
                "location": request.location,
                "policy": request.policy,
                "force_remove": request.force_remove,
            }),
        );
        let mut ctx = CreateContext {
            request,
            template,
            identity: None,
            handle: None,
            result: None,
            policy: PolicyOutcome::NotRequested,
        };

        if let Err(e) = saga.execute(&mut ctx, &mut execution).await {
            error!("Provisioning of {} failed: {}", ctx.request.resource_group, e);
            if execution.status == SagaStatus::Compensated && e.triggers_rollback() {
                info!(
                    "Engine identity {} rolled back, resource group left for inspection",
                    ctx.request.resource_group
                );
            }
            debug!(execution = ?execution, "Saga record");
            return Err(e);
        }

        let deployment = ctx.result.take().ok_or_else(|| missing("deployment result"))?;
        info!(
            "Deployment {} {} in {:.1}s",
            deployment.deployment_name,
            deployment.state,
            deployment.elapsed_secs()
        );
        for (name, value) in &deployment.outputs {
            info!("{} -> {}", name, value);
        }

        Ok(CreateOutcome {
            engine: ctx.request.resource_group,
            deployment,
            policy: ctx.policy,
            execution,
        })
    }

    /// Delete the resource group and the engine identity of the same name.
    /// Both are attempted regardless of the other's outcome.
    #[instrument(skip(self))]
    pub async fn destroy(&self, resource_group: &str) -> DestroyOutcome {
        let pending = match self.cloud.delete_resource_group(resource_group).await {
            Ok(None) => {
                return DestroyOutcome {
                    resource_group: resource_group.to_string(),
                    group: GroupDeletion::Absent,
                    identity: None,
                }
            }
            Ok(Some(handle)) => Ok(handle),
            Err(e) => {
                error!("Could not delete resource group {}: {}", resource_group, e);
                Err(e.to_string())
            }
        };

        let identity = self.remove_identity(resource_group).await;

        let group = match pending {
            Ok(handle) => match handle.wait_deleted(self.config.delete_wait()).await {
                Ok(()) => {
                    info!("Resource group {} deleted", resource_group);
                    GroupDeletion::Deleted
                }
                Err(e) if e.is_timeout() => {
                    info!("Resource group {} is still being deleted", resource_group);
                    GroupDeletion::InProgress
                }
                Err(e) => {
                    error!("Resource group {} deletion failed: {}", resource_group, e);
                    GroupDeletion::Failed(e.to_string())
                }
            },
            Err(message) => GroupDeletion::Failed(message),
        };

        DestroyOutcome {
            resource_group: resource_group.to_string(),
            group,
            identity: Some(identity),
        }
    }

    async fn remove_identity(&self, name: &str) -> IdentityCleanup {
        if let Err(e) = self.smc.login().await {
            error!("SMC login failed, engine {} was not removed: {}", name, e);
            return IdentityCleanup::Failed(e.to_string());
        }

        let deleted = EngineIdentityManager::new(Arc::clone(&self.smc))
            .delete_identity(name)
            .await;
        self.close_session().await;

        match deleted {
            Ok(Deletion::Deleted) => IdentityCleanup::Deleted,
            Ok(Deletion::NotFound) => {
                warn!("Engine {} not found in SMC, nothing to delete", name);
                IdentityCleanup::NotFound
            }
            Err(e) => {
                warn!("{}", e);
                IdentityCleanup::Failed(e.to_string())
            }
        }
    }

    async fn close_session(&self) {
        if let Err(e) = self.smc.logout().await {
            warn!("SMC logout failed: {}", e);
        }
    }
}
