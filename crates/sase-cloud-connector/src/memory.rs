//! In-memory [`ResourceManager`] for tests
//!
//! Deployments follow a [`DeploymentScript`]; every blocking wait on a
//! deployment operation counts as one poll.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::manager::{ResourceManager, Submission};
use crate::operation::Operation;
use crate::types::{
    DeploymentProperties, DeploymentSnapshot, DeploymentState, GroupFilter, Location, Page,
    ResourceGroup, ResourceGroupParams, ResourceSummary,
};
use crate::{CloudError, CloudResult};

/// Seconds of simulated provisioning per poll
const SECONDS_PER_POLL: i64 = 15;

/// How the next submitted deployment behaves
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentScript {
    /// `Succeeded` on the given poll
    SucceedAfter { polls: usize },
    /// `Failed` with `message` on the given poll
    FailAfter { polls: usize, message: String },
    /// Never leaves `Running`; every wait sleeps its full timeout
    Hang,
    /// Already `Succeeded` in the submission response
    CompleteImmediately,
}

impl Default for DeploymentScript {
    fn default() -> Self {
        Self::SucceedAfter { polls: 2 }
    }
}

struct DeploymentRecord {
    correlation_id: String,
    started: DateTime<Utc>,
    script: DeploymentScript,
    polls: usize,
    state: DeploymentState,
    error: Option<String>,
    properties: DeploymentProperties,
}

impl DeploymentRecord {
    fn advance(&mut self) {
        self.polls += 1;
        match &self.script {
            DeploymentScript::SucceedAfter { polls } if self.polls >= *polls => {
                self.state = DeploymentState::Succeeded;
            }
            DeploymentScript::FailAfter { polls, message } if self.polls >= *polls => {
                self.state = DeploymentState::Failed;
                self.error = Some(message.clone());
            }
            DeploymentScript::CompleteImmediately => {}
            _ => self.state = DeploymentState::Running,
        }
    }

    fn snapshot(&self, name: &str) -> DeploymentSnapshot {
        let outputs = if self.state.is_success() {
            BTreeMap::from([
                ("engineName".to_string(), json!(name)),
                ("publicIp".to_string(), json!("52.160.0.10")),
            ])
        } else {
            BTreeMap::new()
        };
        DeploymentSnapshot {
            name: name.to_string(),
            correlation_id: self.correlation_id.clone(),
            provisioning_state: self.state.clone(),
            timestamp: self.started + chrono::Duration::seconds(SECONDS_PER_POLL * self.polls as i64),
            outputs,
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    groups: BTreeMap<String, ResourceGroup>,
    resources: HashMap<String, Vec<ResourceSummary>>,
    locations: Vec<Location>,
    page_size: usize,
    deployments: HashMap<(String, String), DeploymentRecord>,
    script: DeploymentScript,
    reject_group_creation: Option<String>,
    reject_submission: Option<String>,
    reject_group_deletion: Option<String>,
    fail_group_deletion: Option<String>,
    stall_group_deletion: bool,
    group_writes: HashMap<String, usize>,
    delete_calls: HashMap<String, usize>,
    wait_calls: usize,
    deployment_fetches: usize,
}

/// Resource Manager held in process memory
#[derive(Clone)]
pub struct InMemoryResourceManager {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResourceManager {
    pub fn new() -> Self {
        let state = State {
            page_size: 50,
            locations: ["westus", "eastus", "westeurope"]
                .into_iter()
                .map(|name| Location { name: name.into(), display_name: None })
                .collect(),
            ..State::default()
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().page_size = page_size.max(1);
        self
    }

    pub fn with_group(self, name: &str, location: &str, tags: &[(&str, &str)]) -> Self {
        self.state.lock().groups.insert(
            name.to_string(),
            ResourceGroup {
                name: name.to_string(),
                location: location.to_string(),
                tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                managed_by: None,
            },
        );
        self
    }

    pub fn with_resource(self, group: &str, name: &str, resource_type: &str) -> Self {
        self.state
            .lock()
            .resources
            .entry(group.to_string())
            .or_default()
            .push(ResourceSummary {
                name: name.to_string(),
                resource_type: resource_type.to_string(),
                location: None,
            });
        self
    }

    /// Script for deployments submitted from now on
    pub fn script_deployment(&self, script: DeploymentScript) {
        self.state.lock().script = script;
    }

    pub fn reject_group_creation(&self, message: &str) {
        self.state.lock().reject_group_creation = Some(message.to_string());
    }

    pub fn reject_submission(&self, message: &str) {
        self.state.lock().reject_submission = Some(message.to_string());
    }

    /// Group deletes are refused up front
    pub fn reject_group_deletion(&self, message: &str) {
        self.state.lock().reject_group_deletion = Some(message.to_string());
    }

    /// Group deletes are accepted, then end in error
    pub fn fail_group_deletion(&self, message: &str) {
        self.state.lock().fail_group_deletion = Some(message.to_string());
    }

    /// Group deletes are accepted and never finish
    pub fn stall_group_deletion(&self) {
        self.state.lock().stall_group_deletion = true;
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.state.lock().groups.contains_key(name)
    }

    pub fn group(&self, name: &str) -> Option<ResourceGroup> {
        self.state.lock().groups.get(name).cloned()
    }

    /// Create-or-update calls for `name`
    pub fn group_writes(&self, name: &str) -> usize {
        self.state.lock().group_writes.get(name).copied().unwrap_or(0)
    }

    pub fn delete_calls(&self, name: &str) -> usize {
        self.state.lock().delete_calls.get(name).copied().unwrap_or(0)
    }

    pub fn wait_calls(&self) -> usize {
        self.state.lock().wait_calls
    }

    pub fn deployment_fetches(&self) -> usize {
        self.state.lock().deployment_fetches
    }

    /// `parameters` of the deployment submitted to `resource_group`
    pub fn submitted_parameters(&self, resource_group: &str) -> Option<Value> {
        self.state
            .lock()
            .deployments
            .iter()
            .find(|((rg, _), _)| rg == resource_group)
            .map(|(_, record)| record.properties.parameters.clone())
    }

    fn page<T: Clone>(items: &[T], next_link: Option<&str>, page_size: usize) -> CloudResult<Page<T>> {
        let offset = match next_link {
            Some(link) => link
                .parse::<usize>()
                .map_err(|_| CloudError::Validation(format!("bad continuation token {link}")))?,
            None => 0,
        };
        let end = (offset + page_size).min(items.len());
        Ok(Page {
            value: items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default(),
            next_link: (end < items.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl ResourceManager for InMemoryResourceManager {
    async fn create_or_update_group(&self, name: &str, params: &ResourceGroupParams) -> CloudResult<ResourceGroup> {
        let mut state = self.state.lock();
        *state.group_writes.entry(name.to_string()).or_default() += 1;
        if let Some(message) = &state.reject_group_creation {
            return Err(CloudError::Api {
                status: 403,
                code: "AuthorizationFailed".into(),
                message: message.clone(),
            });
        }

        let group = ResourceGroup {
            name: name.to_string(),
            location: params.location.clone(),
            tags: params.tags.clone(),
            managed_by: None,
        };
        state.groups.insert(name.to_string(), group.clone());
        Ok(group)
    }

    async fn group_exists(&self, name: &str) -> CloudResult<bool> {
        Ok(self.has_group(name))
    }

    async fn begin_delete_group(&self, name: &str) -> CloudResult<Box<dyn Operation<()>>> {
        let mut state = self.state.lock();
        *state.delete_calls.entry(name.to_string()).or_default() += 1;
        if !state.groups.contains_key(name) {
            return Err(CloudError::NotFound(format!("resource group {name}")));
        }
        if let Some(message) = &state.reject_group_deletion {
            return Err(CloudError::Api {
                status: 409,
                code: "ScopeLocked".into(),
                message: message.clone(),
            });
        }
        Ok(Box::new(GroupDeletion {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            done: false,
        }))
    }

    async fn begin_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        properties: &DeploymentProperties,
    ) -> CloudResult<Submission> {
        let mut state = self.state.lock();
        if !state.groups.contains_key(resource_group) {
            return Err(CloudError::NotFound(format!("resource group {resource_group}")));
        }
        if let Some(message) = &state.reject_submission {
            return Err(CloudError::Api {
                status: 400,
                code: "InvalidTemplate".into(),
                message: message.clone(),
            });
        }

        let script = state.script.clone();
        let initial_state = match script {
            DeploymentScript::CompleteImmediately => DeploymentState::Succeeded,
            _ => DeploymentState::Submitted,
        };
        let record = DeploymentRecord {
            correlation_id: Uuid::new_v4().to_string(),
            started: Utc::now(),
            script,
            polls: 0,
            state: initial_state,
            error: None,
            properties: properties.clone(),
        };
        let initial = record.snapshot(deployment_name);
        let key = (resource_group.to_string(), deployment_name.to_string());
        state.deployments.insert(key.clone(), record);

        Ok(Submission {
            operation: Box::new(DeploymentOperation {
                state: Arc::clone(&self.state),
                done: initial.provisioning_state.is_terminal(),
                key,
            }),
            initial,
        })
    }

    async fn get_deployment(&self, resource_group: &str, deployment_name: &str) -> CloudResult<DeploymentSnapshot> {
        let mut state = self.state.lock();
        state.deployment_fetches += 1;
        state
            .deployments
            .get(&(resource_group.to_string(), deployment_name.to_string()))
            .map(|record| record.snapshot(deployment_name))
            .ok_or_else(|| CloudError::NotFound(format!("deployment {deployment_name}")))
    }

    async fn list_groups_page(
        &self,
        filter: Option<&GroupFilter>,
        next_link: Option<&str>,
    ) -> CloudResult<Page<ResourceGroup>> {
        let state = self.state.lock();
        let groups: Vec<ResourceGroup> = state
            .groups
            .values()
            .filter(|g| filter.map_or(true, |f| f.matches(g)))
            .cloned()
            .collect();
        Self::page(&groups, next_link, state.page_size)
    }

    async fn list_resources_page(&self, resource_group: &str, next_link: Option<&str>) -> CloudResult<Page<ResourceSummary>> {
        let state = self.state.lock();
        if !state.groups.contains_key(resource_group) {
            return Err(CloudError::NotFound(format!("resource group {resource_group}")));
        }
        let resources = state.resources.get(resource_group).cloned().unwrap_or_default();
        Self::page(&resources, next_link, state.page_size)
    }

    async fn list_locations_page(&self, _subscription_id: &str, next_link: Option<&str>) -> CloudResult<Page<Location>> {
        let state = self.state.lock();
        Self::page(&state.locations, next_link, state.page_size)
    }
}

struct DeploymentOperation {
    state: Arc<Mutex<State>>,
    key: (String, String),
    done: bool,
}

#[async_trait]
impl Operation<DeploymentSnapshot> for DeploymentOperation {
    fn is_done(&self) -> bool {
        self.done
    }

    async fn wait(&mut self, timeout: Duration) -> CloudResult<()> {
        let hung = {
            let mut state = self.state.lock();
            state.wait_calls += 1;
            let record = state
                .deployments
                .get_mut(&self.key)
                .ok_or_else(|| CloudError::NotFound(format!("deployment {}", self.key.1)))?;
            if record.state.is_terminal() {
                self.done = true;
                return Ok(());
            }
            record.advance();
            self.done = record.state.is_terminal();
            record.script == DeploymentScript::Hang
        };
        if hung {
            tokio::time::sleep(timeout).await;
        }
        Ok(())
    }

    async fn result(&mut self, timeout: Duration) -> CloudResult<DeploymentSnapshot> {
        if !self.done {
            self.wait(timeout).await?;
        }
        let state = self.state.lock();
        let record = state
            .deployments
            .get(&self.key)
            .ok_or_else(|| CloudError::NotFound(format!("deployment {}", self.key.1)))?;
        if !record.state.is_terminal() {
            return Err(CloudError::Timeout {
                operation: format!("deployment {}", self.key.1),
                waited: timeout,
            });
        }
        Ok(record.snapshot(&self.key.1))
    }
}

struct GroupDeletion {
    state: Arc<Mutex<State>>,
    name: String,
    done: bool,
}

#[async_trait]
impl Operation<()> for GroupDeletion {
    fn is_done(&self) -> bool {
        self.done
    }

    async fn wait(&mut self, timeout: Duration) -> CloudResult<()> {
        let stalled = {
            let mut state = self.state.lock();
            if let Some(message) = &state.fail_group_deletion {
                return Err(CloudError::Api {
                    status: 500,
                    code: "ResourceGroupDeletionBlocked".into(),
                    message: message.clone(),
                });
            }
            if !state.stall_group_deletion {
                state.groups.remove(&self.name);
                state.resources.remove(&self.name);
                state.deployments.retain(|(rg, _), _| rg != &self.name);
                self.done = true;
            }
            state.stall_group_deletion
        };
        if stalled {
            tokio::time::sleep(timeout).await;
        }
        Ok(())
    }

    async fn result(&mut self, timeout: Duration) -> CloudResult<()> {
        if !self.done {
            self.wait(timeout).await?;
        }
        if !self.done {
            return Err(CloudError::Timeout {
                operation: format!("delete resource group {}", self.name),
                waited: timeout,
            });
        }
        Ok(())
    }
}
