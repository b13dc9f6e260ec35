//! Resource discovery
//!
//! Read-only listing in one of four modes. Exactly one mode is chosen per
//! call; asking for two is a configuration error.

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::manager::ResourceManager;
use crate::orchestrator::CloudOrchestrator;
use crate::types::{GroupFilter, Location, ResourceGroup, ResourceSummary};
use crate::{CloudError, CloudResult};

/// Tag key looked up when `by_tag` is given without a value
pub const DEFAULT_DISCOVERY_TAG: &str = "stonesoft";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListMode {
    /// Resource groups carrying this tag key
    ByTag(String),
    /// Every resource group in the subscription
    All,
    /// Resources inside one group
    ResourcesInGroup(String),
    /// Regions available to the subscription
    Locations,
}

impl ListMode {
    /// Build from independent selections. An empty tag means the default tag.
    pub fn from_selection(
        by_tag: Option<String>,
        all: bool,
        group: Option<String>,
        locations: bool,
    ) -> CloudResult<Self> {
        let selected = [by_tag.is_some(), all, group.is_some(), locations]
            .iter()
            .filter(|s| **s)
            .count();
        if selected != 1 {
            return Err(CloudError::Configuration(format!(
                "exactly one list mode must be chosen (by tag, all, resources in group, locations), got {}",
                selected
            )));
        }

        Ok(match (by_tag, group) {
            (Some(tag), _) if tag.is_empty() => Self::ByTag(DEFAULT_DISCOVERY_TAG.into()),
            (Some(tag), _) => Self::ByTag(tag),
            (_, Some(group)) => Self::ResourcesInGroup(group),
            _ if all => Self::All,
            _ => Self::Locations,
        })
    }
}

/// One listed item
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Discovered {
    Group(ResourceGroup),
    Resource(ResourceSummary),
    Location(Location),
}

/// Query front-end over a [`CloudOrchestrator`]
pub struct Discovery<R: ?Sized> {
    cloud: CloudOrchestrator<R>,
    subscription_id: String,
}

impl<R: ResourceManager + ?Sized + 'static> Discovery<R> {
    pub fn new(cloud: CloudOrchestrator<R>, subscription_id: impl Into<String>) -> Self {
        Self {
            cloud,
            subscription_id: subscription_id.into(),
        }
    }

    /// Lazy stream for `mode`; each call issues a fresh query.
    pub fn discover(&self, mode: &ListMode) -> BoxStream<'static, CloudResult<Discovered>> {
        tracing::debug!(?mode, "Listing");
        match mode {
            ListMode::ByTag(tag) => self
                .cloud
                .list_groups(Some(GroupFilter::TagName(tag.clone())))
                .map_ok(Discovered::Group)
                .boxed(),
            ListMode::All => self.cloud.list_groups(None).map_ok(Discovered::Group).boxed(),
            ListMode::ResourcesInGroup(group) => self
                .cloud
                .list_resources_in_group(group)
                .map_ok(Discovered::Resource)
                .boxed(),
            ListMode::Locations => self
                .cloud
                .list_locations(&self.subscription_id)
                .map_ok(Discovered::Location)
                .boxed(),
        }
    }
}
