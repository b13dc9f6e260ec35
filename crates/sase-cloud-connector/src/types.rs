//! Resource Manager data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use url::Url;

use crate::{CloudError, CloudResult};

// =============================================================================
// Resource groups and discovery results
// =============================================================================

/// Resource group as returned by the Resource Manager
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub managed_by: Option<String>,
}

impl ResourceGroup {
    /// Tag names are case-insensitive in Azure, so `Stonesoft` matches `stonesoft`.
    pub fn has_tag(&self, key: &str) -> bool {
        self.tags.keys().any(|k| k.eq_ignore_ascii_case(key))
    }
}

/// Create-or-update body for a resource group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupParams {
    pub location: String,
    pub tags: HashMap<String, String>,
}

impl ResourceGroupParams {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into(), tags: HashMap::new() }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Resource inside a group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Region available to a subscription
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One page of a list response
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(default)]
    pub next_link: Option<String>,
}

/// Server-side resource group filter
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupFilter {
    /// Groups carrying a tag with this key
    TagName(String),
}

impl GroupFilter {
    /// OData `$filter` expression
    pub fn to_odata(&self) -> String {
        match self {
            Self::TagName(key) => format!("tagName eq '{}'", key.replace('\'', "''")),
        }
    }

    pub fn matches(&self, group: &ResourceGroup) -> bool {
        match self {
            Self::TagName(key) => group.has_tag(key),
        }
    }
}

// =============================================================================
// Deployments
// =============================================================================

/// Provisioning state of a template deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    /// Anything the orchestrator does not know. Terminal.
    Other(String),
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted | Self::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "Submitted",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for DeploymentState {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "submitted" | "accepted" | "created" => Self::Submitted,
            "running" | "inprogress" | "creating" | "updating" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl From<String> for DeploymentState {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<DeploymentState> for String {
    fn from(state: DeploymentState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment template, inline or linked
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateSource {
    Inline(Value),
    Link(Url),
}

impl TemplateSource {
    pub fn validate(&self) -> CloudResult<()> {
        match self {
            Self::Inline(template) if !template.is_object() => Err(CloudError::Validation(
                "inline template must be a JSON object".into(),
            )),
            Self::Link(uri) if !matches!(uri.scheme(), "http" | "https") => Err(CloudError::Validation(
                format!("template link must be http(s), got {}", uri),
            )),
            _ => Ok(()),
        }
    }
}

/// The fixed NGFW template parameter set
#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentParameters {
    pub engine_cfg: String,
    pub engine_username: String,
    pub ssh_key: String,
}

impl DeploymentParameters {
    /// Parameters wrapped as named values: `{"engineCfg": {"value": ...}, ...}`
    pub fn to_arm(&self) -> Value {
        json!({
            "engineCfg": { "value": self.engine_cfg },
            "engineUsername": { "value": self.engine_username },
            "sshKey": { "value": self.ssh_key },
        })
    }
}

impl fmt::Debug for DeploymentParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentParameters")
            .field("engine_cfg", &format_args!("<{} bytes>", self.engine_cfg.len()))
            .field("engine_username", &self.engine_username)
            .field("ssh_key", &format_args!("<{} bytes>", self.ssh_key.len()))
            .finish()
    }
}

/// Everything needed to deploy the NGFW template into a resource group
#[derive(Clone, Debug)]
pub struct DeploymentRequest {
    pub resource_group: String,
    pub deployment_name: String,
    pub location: String,
    pub template: TemplateSource,
    pub parameters: DeploymentParameters,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TemplateLink {
    pub uri: String,
}

/// Deployment `properties` body
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_link: Option<TemplateLink>,
    pub parameters: Value,
}

impl DeploymentProperties {
    pub fn incremental(template: &TemplateSource, parameters: &DeploymentParameters) -> Self {
        let (template, template_link) = match template {
            TemplateSource::Inline(doc) => (Some(doc.clone()), None),
            TemplateSource::Link(uri) => (None, Some(TemplateLink { uri: uri.to_string() })),
        };
        Self {
            mode: "Incremental".into(),
            template,
            template_link,
            parameters: parameters.to_arm(),
        }
    }
}

/// Point-in-time view of a deployment
#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentSnapshot {
    pub name: String,
    pub correlation_id: String,
    pub provisioning_state: DeploymentState,
    pub timestamp: DateTime<Utc>,
    /// Output name to output value
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
}

impl DeploymentSnapshot {
    /// Unwrap `{"name": {"type": .., "value": ..}}` template outputs
    pub fn outputs_from_arm(raw: Option<&Value>) -> BTreeMap<String, Value> {
        raw.and_then(Value::as_object)
            .map(|outputs: &Map<String, Value>| {
                outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.get("value").cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Terminal outcome of a deployment
#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentResult {
    pub deployment_name: String,
    pub correlation_id: String,
    pub state: DeploymentState,
    pub elapsed: chrono::Duration,
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
}

impl DeploymentResult {
    pub fn from_snapshots(initial: &DeploymentSnapshot, terminal: DeploymentSnapshot) -> Self {
        Self {
            deployment_name: terminal.name,
            correlation_id: terminal.correlation_id,
            state: terminal.provisioning_state,
            elapsed: terminal.timestamp - initial.timestamp,
            outputs: terminal.outputs,
            error: terminal.error,
        }
    }

    /// `Ok` only for `Succeeded`
    pub fn into_success(self) -> CloudResult<Self> {
        if self.state.is_success() {
            Ok(self)
        } else {
            Err(CloudError::DeploymentFailed {
                deployment: self.deployment_name,
                state: self.state,
                message: self.error.unwrap_or_else(|| "no error details returned".into()),
            })
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.num_milliseconds() as f64 / 1000.0
    }
}
