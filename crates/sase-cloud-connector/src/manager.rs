//! Cloud collaborator interface

use async_trait::async_trait;

use crate::operation::Operation;
use crate::types::{
    DeploymentProperties, DeploymentSnapshot, GroupFilter, Location, Page, ResourceGroup,
    ResourceGroupParams, ResourceSummary,
};
use crate::CloudResult;

/// Accepted deployment: the submission response plus its poller
pub struct Submission {
    pub initial: DeploymentSnapshot,
    pub operation: Box<dyn Operation<DeploymentSnapshot>>,
}

/// Resource Manager calls used by provisioning and discovery
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn create_or_update_group(&self, name: &str, params: &ResourceGroupParams) -> CloudResult<ResourceGroup>;

    async fn group_exists(&self, name: &str) -> CloudResult<bool>;

    async fn begin_delete_group(&self, name: &str) -> CloudResult<Box<dyn Operation<()>>>;

    async fn begin_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        properties: &DeploymentProperties,
    ) -> CloudResult<Submission>;

    async fn get_deployment(&self, resource_group: &str, deployment_name: &str) -> CloudResult<DeploymentSnapshot>;

    /// One page of groups; `next_link` continues a previous page
    async fn list_groups_page(
        &self,
        filter: Option<&GroupFilter>,
        next_link: Option<&str>,
    ) -> CloudResult<Page<ResourceGroup>>;

    async fn list_resources_page(&self, resource_group: &str, next_link: Option<&str>) -> CloudResult<Page<ResourceSummary>>;

    async fn list_locations_page(&self, subscription_id: &str, next_link: Option<&str>) -> CloudResult<Page<Location>>;
}
