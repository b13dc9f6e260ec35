//! Cloud Resource Orchestrator
//!
//! Resource group lifecycle, deployment submission and the bounded poll loop
//! that drives a deployment to a terminal state.

use futures::future::Future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument};

use crate::manager::{ResourceManager, Submission};
use crate::operation::{DeleteHandle, DeploymentHandle};
use crate::types::{
    DeploymentProperties, DeploymentRequest, DeploymentResult, GroupFilter, Location, Page,
    ResourceGroup, ResourceGroupParams, ResourceSummary,
};
use crate::{CloudError, CloudResult};

/// Bounds for [`CloudOrchestrator::await_terminal`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Longest single blocking wait on the operation
    pub per_poll_timeout: Duration,
    /// Overall deadline; exceeding it is a timeout error
    pub ceiling: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            per_poll_timeout: Duration::from_secs(30),
            ceiling: Duration::from_secs(60 * 60),
        }
    }
}

/// Owns resource groups and deployments on one [`ResourceManager`]
pub struct CloudOrchestrator<R: ?Sized> {
    manager: Arc<R>,
}

impl<R: ?Sized> Clone for CloudOrchestrator<R> {
    fn clone(&self) -> Self {
        Self { manager: Arc::clone(&self.manager) }
    }
}

impl<R: ResourceManager + ?Sized + 'static> CloudOrchestrator<R> {
    pub fn new(manager: Arc<R>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<R> {
        &self.manager
    }

    /// Create-or-update; existing tags are replaced by `tags`
    #[instrument(skip(self, tags))]
    pub async fn ensure_resource_group(
        &self,
        name: &str,
        location: &str,
        tags: &HashMap<String, String>,
    ) -> CloudResult<ResourceGroup> {
        let params = ResourceGroupParams {
            location: location.to_string(),
            tags: tags.clone(),
        };
        let group = self.manager.create_or_update_group(name, &params).await?;
        info!("Resource group {} ready in {}", group.name, group.location);
        Ok(group)
    }

    #[instrument(skip(self, request), fields(resource_group = %request.resource_group, deployment = %request.deployment_name))]
    pub async fn submit_deployment(&self, request: &DeploymentRequest) -> CloudResult<DeploymentHandle> {
        request.template.validate()?;
        let properties = DeploymentProperties::incremental(&request.template, &request.parameters);

        let Submission { initial, operation } = self
            .manager
            .begin_deployment(&request.resource_group, &request.deployment_name, &properties)
            .await?;

        info!(
            correlation_id = %initial.correlation_id,
            "Deployment {} submitted, provisioning state: {}",
            request.deployment_name, initial.provisioning_state
        );

        Ok(DeploymentHandle {
            resource_group: request.resource_group.clone(),
            deployment_name: request.deployment_name.clone(),
            initial,
            operation,
        })
    }

    /// Block on the operation in `per_poll_timeout` slices, logging the
    /// provisioning state after each one, until it is done. Fails with
    /// [`CloudError::Timeout`] once `ceiling` has elapsed.
    pub async fn await_terminal(
        &self,
        handle: &mut DeploymentHandle,
        policy: &PollPolicy,
    ) -> CloudResult<DeploymentResult> {
        let deadline = Instant::now() + policy.ceiling;
        let operation = format!("deployment {}/{}", handle.resource_group, handle.deployment_name);
        let timed_out = || CloudError::Timeout {
            operation: operation.clone(),
            waited: policy.ceiling,
        };
        let mut last_state = handle.initial.provisioning_state.clone();

        while !handle.operation.is_done() {
            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }

            let slice = policy.per_poll_timeout.min(deadline - now);
            match timeout_at(deadline, handle.operation.wait(slice)).await {
                Ok(waited) => waited?,
                Err(_) => return Err(timed_out()),
            }

            let snapshot = self
                .manager
                .get_deployment(&handle.resource_group, &handle.deployment_name)
                .await?;
            info!("Azure provisioning state: {}", snapshot.provisioning_state);
            if snapshot.provisioning_state != last_state {
                debug!(from = %last_state, to = %snapshot.provisioning_state, "Deployment state changed");
                last_state = snapshot.provisioning_state;
            }
        }

        let terminal = handle.operation.result(policy.per_poll_timeout).await?;
        Ok(DeploymentResult::from_snapshots(&handle.initial, terminal))
    }

    /// `None` when the group does not exist
    #[instrument(skip(self))]
    pub async fn delete_resource_group(&self, name: &str) -> CloudResult<Option<DeleteHandle>> {
        if !self.manager.group_exists(name).await? {
            info!("Resource group {} does not exist, nothing to delete", name);
            return Ok(None);
        }

        let operation = self.manager.begin_delete_group(name).await?;
        info!("Deleting resource group {}", name);
        Ok(Some(DeleteHandle {
            resource_group: name.to_string(),
            operation,
        }))
    }

    pub fn list_groups(&self, filter: Option<GroupFilter>) -> BoxStream<'static, CloudResult<ResourceGroup>> {
        let manager = Arc::clone(&self.manager);
        paginate(move |next_link| {
            let manager = Arc::clone(&manager);
            let filter = filter.clone();
            async move { manager.list_groups_page(filter.as_ref(), next_link.as_deref()).await }
        })
    }

    pub fn list_resources_in_group(&self, name: &str) -> BoxStream<'static, CloudResult<ResourceSummary>> {
        let manager = Arc::clone(&self.manager);
        let name = name.to_string();
        paginate(move |next_link| {
            let manager = Arc::clone(&manager);
            let name = name.clone();
            async move { manager.list_resources_page(&name, next_link.as_deref()).await }
        })
    }

    pub fn list_locations(&self, subscription_id: &str) -> BoxStream<'static, CloudResult<Location>> {
        let manager = Arc::clone(&self.manager);
        let subscription_id = subscription_id.to_string();
        paginate(move |next_link| {
            let manager = Arc::clone(&manager);
            let subscription_id = subscription_id.clone();
            async move { manager.list_locations_page(&subscription_id, next_link.as_deref()).await }
        })
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazy item stream over `fetch`ed pages. Nothing is requested until the
/// stream is polled.
fn paginate<T, F, Fut>(fetch: F) -> BoxStream<'static, CloudResult<T>>
where
    T: Send + 'static,
    F: Fn(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = CloudResult<Page<T>>> + Send + 'static,
{
    stream::try_unfold((Cursor::Start, fetch), |(cursor, fetch)| async move {
        let next_link = match cursor {
            Cursor::Done => return Ok::<_, CloudError>(None),
            Cursor::Start => None,
            Cursor::Next(link) => Some(link),
        };

        let page = fetch(next_link).await?;
        let cursor = match page.next_link {
            Some(link) if !link.is_empty() => Cursor::Next(link),
            _ => Cursor::Done,
        };
        Ok(Some((page.value, (cursor, fetch))))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
