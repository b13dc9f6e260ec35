//! Output formatting

use clap::ValueEnum;
use sase_cloud_connector::{DeploymentState, Discovered};
use sase_orchestrator::{CreateOutcome, DestroyOutcome, IdentityCleanup, PolicyOutcome, SagaExecution};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Structured formats serialize `data`; table format renders `rows`.
    pub fn render<T: Serialize, R: Tabled>(&self, data: &T, rows: Vec<R>) -> anyhow::Result<String> {
        Ok(match self {
            OutputFormat::Json => serde_json::to_string_pretty(data)?,
            OutputFormat::Yaml => serde_yaml::to_string(data)?,
            OutputFormat::Table => Table::new(rows).with(Style::psql()).to_string(),
        })
    }
}

#[derive(Tabled)]
struct Field {
    #[tabled(rename = "Field")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl Field {
    fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self { key: key.into(), value: value.to_string() }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Serialize)]
pub struct CreateReport<'a> {
    engine: &'a str,
    deployment: &'a str,
    correlation_id: &'a str,
    state: &'a DeploymentState,
    elapsed_secs: f64,
    outputs: &'a BTreeMap<String, Value>,
    policy: &'a PolicyOutcome,
    execution: &'a SagaExecution,
}

impl<'a> CreateReport<'a> {
    pub fn new(outcome: &'a CreateOutcome) -> Self {
        Self {
            engine: &outcome.engine,
            deployment: &outcome.deployment.deployment_name,
            correlation_id: &outcome.deployment.correlation_id,
            state: &outcome.deployment.state,
            elapsed_secs: outcome.deployment.elapsed_secs(),
            outputs: &outcome.deployment.outputs,
            policy: &outcome.policy,
            execution: &outcome.execution,
        }
    }

    pub fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        let mut rows = vec![
            Field::new("engine", self.engine),
            Field::new("deployment", self.deployment),
            Field::new("correlation id", self.correlation_id),
            Field::new("state", self.state.as_str()),
            Field::new("elapsed", format!("{:.1}s", self.elapsed_secs)),
        ];
        rows.extend(self.outputs.iter().map(|(k, v)| Field::new(format!("output {}", k), display_value(v))));
        rows.push(Field::new(
            "policy",
            match self.policy {
                PolicyOutcome::NotRequested => "not requested".to_string(),
                PolicyOutcome::Applied { policy } => format!("{} applied", policy),
                PolicyOutcome::Failed { policy, message } => format!("{} failed: {}", policy, message),
            },
        ));
        format.render(self, rows)
    }
}

#[derive(Serialize)]
pub struct DestroyReport<'a> {
    resource_group: &'a str,
    group: String,
    identity: String,
    clean: bool,
}

impl<'a> DestroyReport<'a> {
    pub fn new(outcome: &'a DestroyOutcome) -> Self {
        let identity = match &outcome.identity {
            None => "not attempted".to_string(),
            Some(IdentityCleanup::Deleted) => "deleted".to_string(),
            Some(IdentityCleanup::NotFound) => "not found".to_string(),
            Some(IdentityCleanup::Failed(msg)) => format!("failed: {}", msg),
        };
        Self {
            resource_group: &outcome.resource_group,
            group: outcome.group.to_string(),
            identity,
            clean: outcome.is_clean(),
        }
    }

    pub fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        let rows = vec![
            Field::new("resource group", self.resource_group),
            Field::new("group", &self.group),
            Field::new("engine", &self.identity),
        ];
        format.render(self, rows)
    }
}

#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl From<&Discovered> for ListRow {
    fn from(item: &Discovered) -> Self {
        match item {
            Discovered::Group(group) => {
                let mut tags: Vec<String> = group.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                tags.sort();
                let mut details = tags.join(", ");
                if let Some(owner) = &group.managed_by {
                    details = format!("managed by {}; {}", owner, details);
                }
                Self {
                    name: group.name.clone(),
                    kind: "resource group".into(),
                    location: group.location.clone(),
                    details,
                }
            }
            Discovered::Resource(resource) => Self {
                name: resource.name.clone(),
                kind: resource.resource_type.clone(),
                location: resource.location.clone().unwrap_or_default(),
                details: String::new(),
            },
            Discovered::Location(location) => Self {
                name: location.name.clone(),
                kind: "location".into(),
                location: location.name.clone(),
                details: location.display_name.clone().unwrap_or_default(),
            },
        }
    }
}

pub fn render_discovered(items: &[Discovered], format: OutputFormat) -> anyhow::Result<String> {
    format.render(&items, items.iter().map(ListRow::from).collect())
}
