//! Azure Resource Manager REST client
//!
//! Implements [`ResourceManager`] over the public ARM endpoints. Long-running
//! calls (group deletion, template deployment) hand back pollers that follow
//! the `Azure-AsyncOperation` / `Location` headers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::TokenCache;
use crate::credentials::{AzureCredentials, CredentialChain, Environment, ENV_SUBSCRIPTION_ID};
use crate::manager::{ResourceManager, Submission};
use crate::operation::Operation;
use crate::types::{
    DeploymentProperties, DeploymentSnapshot, DeploymentState, GroupFilter, Location, Page,
    ResourceGroup, ResourceGroupParams, ResourceSummary,
};
use crate::{CloudError, CloudResult};

pub const DEFAULT_RESOURCE_MANAGER_URL: &str = "https://management.azure.com/";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub const ENV_RESOURCE_MANAGER_URL: &str = "AZURE_RESOURCE_MANAGER_URL";

const ASYNC_OPERATION: &str = "azure-asyncoperation";

// =============================================================================
// Configuration
// =============================================================================

/// Resource Manager endpoint settings
#[derive(Clone, Debug)]
pub struct ArmConfig {
    pub endpoint: Url,
    pub authority: Url,
    pub subscription_id: String,
    /// api-version for resource groups, deployments and resources
    pub resources_api_version: String,
    /// api-version for subscription-level calls (locations)
    pub subscriptions_api_version: String,
    /// Delay between status requests inside a poller
    pub poll_interval: Duration,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Retries on 429 and 5xx
    pub max_retries: u32,
    /// Backoff step when the server sends no `Retry-After`
    pub retry_backoff: Duration,
}

impl ArmConfig {
    pub fn new(subscription_id: impl Into<String>) -> CloudResult<Self> {
        Ok(Self {
            endpoint: Url::parse(DEFAULT_RESOURCE_MANAGER_URL)?,
            authority: Url::parse(DEFAULT_AUTHORITY_HOST)?,
            subscription_id: subscription_id.into(),
            resources_api_version: "2021-04-01".into(),
            subscriptions_api_version: "2022-12-01".into(),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
        })
    }

    /// Subscription from `AZURE_SUBSCRIPTION_ID`; endpoints may be overridden
    /// for sovereign clouds.
    pub fn from_environment(env: &Environment) -> CloudResult<Self> {
        let subscription_id = env.get(ENV_SUBSCRIPTION_ID).ok_or_else(|| {
            CloudError::Configuration(format!("{} is not set", ENV_SUBSCRIPTION_ID))
        })?;

        let mut config = Self::new(subscription_id)?;
        if let Some(endpoint) = env.get(ENV_RESOURCE_MANAGER_URL) {
            config.endpoint = with_trailing_slash(endpoint)?;
        }
        if let Some(authority) = env.get(ENV_AUTHORITY_HOST) {
            config.authority = with_trailing_slash(authority)?;
        }
        Ok(config)
    }
}

fn with_trailing_slash(raw: &str) -> CloudResult<Url> {
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{}/", raw))?)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ArmErrorEnvelope {
    #[serde(default)]
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ArmDeployment {
    name: String,
    properties: ArmDeploymentProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmDeploymentProperties {
    provisioning_state: DeploymentState,
    #[serde(default)]
    correlation_id: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    outputs: Option<Value>,
    #[serde(default)]
    error: Option<ArmErrorDetail>,
}

impl From<ArmDeployment> for DeploymentSnapshot {
    fn from(deployment: ArmDeployment) -> Self {
        let props = deployment.properties;
        Self {
            name: deployment.name,
            correlation_id: props.correlation_id,
            provisioning_state: props.provisioning_state,
            timestamp: props.timestamp.unwrap_or_else(Utc::now),
            outputs: DeploymentSnapshot::outputs_from_arm(props.outputs.as_ref()),
            error: props.error.map(|e| format!("{}: {}", e.code, e.message)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AsyncOperationStatus {
    status: DeploymentState,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP implementation of [`ResourceManager`]
#[derive(Clone, Debug)]
pub struct AzureClient {
    http_client: reqwest::Client,
    tokens: Arc<TokenCache>,
    config: Arc<ArmConfig>,
}

impl AzureClient {
    pub fn new(config: ArmConfig, credentials: AzureCredentials) -> CloudResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CloudError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        let tokens = TokenCache::new(credentials, config.authority.clone(), &config.endpoint);

        Ok(Self {
            http_client,
            tokens: Arc::new(tokens),
            config: Arc::new(config),
        })
    }

    /// Resolve credentials through `chain` and endpoint settings from `env`
    pub fn from_environment(env: &Environment, chain: &CredentialChain) -> CloudResult<Self> {
        let credentials = chain.resolve(env)?;
        let config = ArmConfig::from_environment(env)?;
        Self::new(config, credentials)
    }

    pub fn subscription_id(&self) -> &str {
        &self.config.subscription_id
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    fn url(&self, path: &str, api_version: &str) -> CloudResult<Url> {
        let mut url = self.config.endpoint.join(path)?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn group_url(&self, name: &str) -> CloudResult<Url> {
        self.url(
            &format!("subscriptions/{}/resourcegroups/{}", self.config.subscription_id, name),
            &self.config.resources_api_version,
        )
    }

    fn deployment_url(&self, resource_group: &str, deployment_name: &str) -> CloudResult<Url> {
        self.url(
            &format!(
                "subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}",
                self.config.subscription_id, resource_group, deployment_name
            ),
            &self.config.resources_api_version,
        )
    }

    /// Send with bearer auth, retrying throttled and server-side failures
    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> CloudResult<Response> {
        let mut attempt = 0;
        loop {
            let token = self.tokens.get_token().await?;
            let mut request = self
                .http_client
                .request(method.clone(), url.clone())
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                attempt += 1;
                self.tokens.invalidate().await;
                continue;
            }
            if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                && attempt < self.config.max_retries
            {
                attempt += 1;
                let delay = retry_after(response.headers())
                    .unwrap_or(self.config.retry_backoff * attempt);
                warn!(%status, attempt, "Resource Manager request to {} failed, retrying in {:?}", url.path(), delay);
                sleep(delay).await;
                continue;
            }
            return Ok(response);
        }
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> CloudResult<Response> {
        let response = self.execute(method, url, body).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: Response) -> CloudError {
        let status = response.status();
        let detail = response
            .json::<ArmErrorEnvelope>()
            .await
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            CloudError::NotFound(if detail.message.is_empty() {
                detail.code
            } else {
                detail.message
            })
        } else {
            CloudError::Api {
                status: status.as_u16(),
                code: detail.code,
                message: detail.message,
            }
        }
    }

    async fn fetch_page<T: serde::de::DeserializeOwned>(&self, url: Url) -> CloudResult<Page<T>> {
        Ok(self.send(Method::GET, url, None).await?.json().await?)
    }

    fn continuation(next_link: &str) -> CloudResult<Url> {
        Ok(Url::parse(next_link)?)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn header_url(headers: &HeaderMap, name: &str) -> Option<Url> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
}

#[async_trait]
impl ResourceManager for AzureClient {
    #[instrument(skip(self, params))]
    async fn create_or_update_group(&self, name: &str, params: &ResourceGroupParams) -> CloudResult<ResourceGroup> {
        let body = serde_json::to_value(params)?;
        let response = self.send(Method::PUT, self.group_url(name)?, Some(&body)).await?;
        Ok(response.json().await?)
    }

    async fn group_exists(&self, name: &str) -> CloudResult<bool> {
        let response = self.execute(Method::HEAD, self.group_url(name)?, None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(Self::api_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn begin_delete_group(&self, name: &str) -> CloudResult<Box<dyn Operation<()>>> {
        let group_url = self.group_url(name)?;
        let response = self.send(Method::DELETE, group_url.clone(), None).await?;
        let done = response.status() != StatusCode::ACCEPTED;
        let status_url = header_url(response.headers(), LOCATION.as_str());

        debug!(done, "Resource group delete accepted");
        Ok(Box::new(DeletePoller {
            client: self.clone(),
            resource_group: name.to_string(),
            status_url,
            group_url,
            done,
        }))
    }

    #[instrument(skip(self, properties))]
    async fn begin_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        properties: &DeploymentProperties,
    ) -> CloudResult<Submission> {
        let url = self.deployment_url(resource_group, deployment_name)?;
        let body = json!({ "properties": properties });
        let response = self.send(Method::PUT, url.clone(), Some(&body)).await?;

        let async_url = header_url(response.headers(), ASYNC_OPERATION);
        let initial: DeploymentSnapshot = response.json::<ArmDeployment>().await?.into();
        let done = initial.provisioning_state.is_terminal();

        Ok(Submission {
            operation: Box::new(DeploymentPoller {
                client: self.clone(),
                resource_url: url,
                async_url,
                done,
            }),
            initial,
        })
    }

    async fn get_deployment(&self, resource_group: &str, deployment_name: &str) -> CloudResult<DeploymentSnapshot> {
        let url = self.deployment_url(resource_group, deployment_name)?;
        let deployment: ArmDeployment = self.send(Method::GET, url, None).await?.json().await?;
        Ok(deployment.into())
    }

    async fn list_groups_page(
        &self,
        filter: Option<&GroupFilter>,
        next_link: Option<&str>,
    ) -> CloudResult<Page<ResourceGroup>> {
        let url = match next_link {
            Some(link) => Self::continuation(link)?,
            None => {
                let mut url = self.url(
                    &format!("subscriptions/{}/resourcegroups", self.config.subscription_id),
                    &self.config.resources_api_version,
                )?;
                if let Some(filter) = filter {
                    url.query_pairs_mut().append_pair("$filter", &filter.to_odata());
                }
                url
            }
        };
        self.fetch_page(url).await
    }

    async fn list_resources_page(&self, resource_group: &str, next_link: Option<&str>) -> CloudResult<Page<ResourceSummary>> {
        let url = match next_link {
            Some(link) => Self::continuation(link)?,
            None => self.url(
                &format!(
                    "subscriptions/{}/resourcegroups/{}/resources",
                    self.config.subscription_id, resource_group
                ),
                &self.config.resources_api_version,
            )?,
        };
        self.fetch_page(url).await
    }

    async fn list_locations_page(&self, subscription_id: &str, next_link: Option<&str>) -> CloudResult<Page<Location>> {
        let url = match next_link {
            Some(link) => Self::continuation(link)?,
            None => self.url(
                &format!("subscriptions/{}/locations", subscription_id),
                &self.config.subscriptions_api_version,
            )?,
        };
        self.fetch_page(url).await
    }
}

// =============================================================================
// Pollers
// =============================================================================

/// Repeats `poll` every `interval` until `done` or the deadline passes
macro_rules! poll_until {
    ($self:ident, $timeout:expr) => {{
        let deadline = Instant::now() + $timeout;
        while !$self.done {
            $self.poll().await?;
            let now = Instant::now();
            if $self.done || now >= deadline {
                break;
            }
            sleep($self.client.config.poll_interval.min(deadline - now)).await;
        }
        Ok(())
    }};
}

struct DeploymentPoller {
    client: AzureClient,
    resource_url: Url,
    async_url: Option<Url>,
    done: bool,
}

impl DeploymentPoller {
    async fn poll(&mut self) -> CloudResult<()> {
        let state = match &self.async_url {
            Some(url) => {
                let response = self.client.send(Method::GET, url.clone(), None).await?;
                response.json::<AsyncOperationStatus>().await?.status
            }
            None => {
                let response = self.client.send(Method::GET, self.resource_url.clone(), None).await?;
                response.json::<ArmDeployment>().await?.properties.provisioning_state
            }
        };
        self.done = state.is_terminal();
        Ok(())
    }
}

#[async_trait]
impl Operation<DeploymentSnapshot> for DeploymentPoller {
    fn is_done(&self) -> bool {
        self.done
    }

    async fn wait(&mut self, timeout: Duration) -> CloudResult<()> {
        poll_until!(self, timeout)
    }

    /// The snapshot returned is always terminal. When the operation status
    /// finishes ahead of the deployment record, polling moves to the record.
    async fn result(&mut self, timeout: Duration) -> CloudResult<DeploymentSnapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            self.wait(deadline.saturating_duration_since(Instant::now())).await?;
            if self.done {
                let response = self.client.send(Method::GET, self.resource_url.clone(), None).await?;
                let snapshot: DeploymentSnapshot = response.json::<ArmDeployment>().await?.into();
                if snapshot.provisioning_state.is_terminal() {
                    return Ok(snapshot);
                }
                debug!(state = %snapshot.provisioning_state, "Deployment record not terminal yet");
                self.async_url = None;
                self.done = false;
            }
            if Instant::now() >= deadline {
                return Err(CloudError::Timeout {
                    operation: format!("deployment {}", self.resource_url.path()),
                    waited: timeout,
                });
            }
            sleep(self.client.config.poll_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}

struct DeletePoller {
    client: AzureClient,
    resource_group: String,
    status_url: Option<Url>,
    group_url: Url,
    done: bool,
}

impl DeletePoller {
    async fn poll(&mut self) -> CloudResult<()> {
        match &self.status_url {
            Some(url) => {
                let response = self.client.execute(Method::GET, url.clone(), None).await?;
                match response.status() {
                    StatusCode::ACCEPTED => {}
                    StatusCode::NOT_FOUND => self.done = true,
                    s if s.is_success() => self.done = true,
                    _ => return Err(AzureClient::api_error(response).await),
                }
            }
            None => {
                let response = self.client.execute(Method::HEAD, self.group_url.clone(), None).await?;
                self.done = response.status() == StatusCode::NOT_FOUND;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Operation<()> for DeletePoller {
    fn is_done(&self) -> bool {
        self.done
    }

    async fn wait(&mut self, timeout: Duration) -> CloudResult<()> {
        poll_until!(self, timeout)
    }

    async fn result(&mut self, timeout: Duration) -> CloudResult<()> {
        self.wait(timeout).await?;
        if self.done {
            Ok(())
        } else {
            Err(CloudError::Timeout {
                operation: format!("delete of resource group {}", self.resource_group),
                waited: timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    async fn client(server: &MockServer) -> AzureClient {
        Mock::given(method("POST"))
            .and(path("/contoso/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "arm-token",
                "expires_in": 3600
            })))
            .mount(server)
            .await;

        let env = Environment::from_pairs([
            ("AZURE_CLIENT_ID", "app"),
            ("AZURE_CLIENT_SECRET", "s3cret"),
            ("AZURE_TENANT_ID", "contoso"),
            (ENV_SUBSCRIPTION_ID, SUB),
            (ENV_AUTHORITY_HOST, server.uri().as_str()),
            (ENV_RESOURCE_MANAGER_URL, server.uri().as_str()),
        ]);
        let mut config = ArmConfig::from_environment(&env).unwrap();
        config.poll_interval = Duration::from_millis(10);
        config.retry_backoff = Duration::from_millis(10);
        let credentials = CredentialChain::default().resolve(&env).unwrap();
        AzureClient::new(config, credentials).unwrap()
    }

    fn deployment_body(state: &str) -> Value {
        json!({
            "name": "ngfw_azure_deployment",
            "properties": {
                "provisioningState": state,
                "correlationId": "corr-1",
                "timestamp": "2024-05-01T10:00:00Z",
                "outputs": { "publicIp": { "type": "String", "value": "52.1.2.3" } }
            }
        })
    }

    #[test]
    fn test_config_requires_subscription() {
        let env = Environment::from_pairs([("AZURE_CLIENT_ID", "app")]);
        assert!(matches!(
            ArmConfig::from_environment(&env),
            Err(CloudError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_create_group_sends_tags() {
        let server = MockServer::start().await;
        let client = client(&server).await;

        Mock::given(method("PUT"))
            .and(path(format!("/subscriptions/{}/resourcegroups/ngfw-rg", SUB)))
            .and(query_param("api-version", "2021-04-01"))
            .and(header("authorization", "Bearer arm-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "name": "ngfw-rg",
                "location": "westus",
                "tags": { "stonesoft": "smc-python" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let group = client
            .create_or_update_group("ngfw-rg", &ResourceGroupParams::new("westus").with_tag("stonesoft", "smc-python"))
            .await
            .unwrap();
        assert!(group.has_tag("stonesoft"));
    }

    #[tokio::test]
    async fn test_group_exists() {
        let server = MockServer::start().await;
        let client = client(&server).await;

        Mock::given(method("HEAD"))
            .and(path(format!("/subscriptions/{}/resourcegroups/present", SUB)))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path(format!("/subscriptions/{}/resourcegroups/absent", SUB)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client.group_exists("present").await.unwrap());
        assert!(!client.group_exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_throttled_request_is_retried() {
        let server = MockServer::start().await;
        let client = client(&server).await;
        let group_path = format!("/subscriptions/{}/resourcegroups/busy", SUB);

        Mock::given(method("HEAD"))
            .and(path(group_path.as_str()))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path(group_path.as_str()))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(client.group_exists("busy").await.unwrap());
    }

    #[tokio::test]
    async fn test_api_error_is_parsed() {
        let server = MockServer::start().await;
        let client = client(&server).await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "LocationNotAvailableForResourceGroup", "message": "bad region" }
            })))
            .mount(&server)
            .await;

        match client.create_or_update_group("rg", &ResourceGroupParams::new("mars")).await {
            Err(CloudError::Api { status, code, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(code, "LocationNotAvailableForResourceGroup");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deployment_follows_async_operation() {
        let server = MockServer::start().await;
        let client = client(&server).await;
        let deployment_path = format!(
            "/subscriptions/{}/resourcegroups/ngfw-rg/providers/Microsoft.Resources/deployments/ngfw_azure_deployment",
            SUB
        );

        Mock::given(method("PUT"))
            .and(path(deployment_path.as_str()))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Azure-AsyncOperation", format!("{}/operations/op1", server.uri()).as_str())
                    .set_body_json(deployment_body("Accepted")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Running" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment_body("Succeeded")))
            .mount(&server)
            .await;

        let properties = DeploymentProperties {
            mode: "Incremental".into(),
            template: Some(json!({ "resources": [] })),
            template_link: None,
            parameters: json!({}),
        };
        let mut submission = client
            .begin_deployment("ngfw-rg", "ngfw_azure_deployment", &properties)
            .await
            .unwrap();

        assert_eq!(submission.initial.provisioning_state, DeploymentState::Submitted);
        assert_eq!(submission.initial.correlation_id, "corr-1");
        assert!(!submission.operation.is_done());

        let snapshot = submission.operation.result(Duration::from_secs(5)).await.unwrap();
        assert!(submission.operation.is_done());
        assert_eq!(snapshot.provisioning_state, DeploymentState::Succeeded);
        assert_eq!(snapshot.outputs["publicIp"], json!("52.1.2.3"));
    }

    #[tokio::test]
    async fn test_in_progress_status_is_not_terminal() {
        let server = MockServer::start().await;
        let client = client(&server).await;
        let deployment_path = format!(
            "/subscriptions/{}/resourcegroups/ngfw-rg/providers/Microsoft.Resources/deployments/ngfw_azure_deployment",
            SUB
        );

        Mock::given(method("PUT"))
            .and(path(deployment_path.as_str()))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Azure-AsyncOperation", format!("{}/operations/op2", server.uri()).as_str())
                    .set_body_json(deployment_body("Accepted")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "InProgress" })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .mount(&server)
            .await;
        // Record lags behind the operation status once
        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment_body("Running")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment_body("Succeeded")))
            .mount(&server)
            .await;

        let properties = DeploymentProperties {
            mode: "Incremental".into(),
            template: Some(json!({ "resources": [] })),
            template_link: None,
            parameters: json!({}),
        };
        let mut submission = client
            .begin_deployment("ngfw-rg", "ngfw_azure_deployment", &properties)
            .await
            .unwrap();

        submission.operation.wait(Duration::from_millis(1)).await.unwrap();
        assert!(!submission.operation.is_done());

        let snapshot = submission.operation.result(Duration::from_secs(5)).await.unwrap();
        assert_eq!(snapshot.provisioning_state, DeploymentState::Succeeded);
        assert_eq!(DeploymentState::from("InProgress"), DeploymentState::Running);
    }

    #[tokio::test]
    async fn test_delete_group_polls_location() {
        let server = MockServer::start().await;
        let client = client(&server).await;

        Mock::given(method("DELETE"))
            .and(path(format!("/subscriptions/{}/resourcegroups/ngfw-rg", SUB)))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Location", format!("{}/operationresults/del1", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operationresults/del1"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operationresults/del1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut operation = client.begin_delete_group("ngfw-rg").await.unwrap();
        assert!(!operation.is_done());
        operation.result(Duration::from_secs(5)).await.unwrap();
        assert!(operation.is_done());
    }

    #[tokio::test]
    async fn test_list_groups_follows_next_link() {
        let server = MockServer::start().await;
        let client = client(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{}/resourcegroups", SUB)))
            .and(query_param("$filter", "tagName eq 'stonesoft'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "name": "rg1", "location": "westus", "tags": { "stonesoft": "smc-python" } }],
                "nextLink": format!("{}/page2", server.uri())
            })))
            .mount(&server)
            .await;

        let filter = GroupFilter::TagName("stonesoft".into());
        let page = client.list_groups_page(Some(&filter), None).await.unwrap();
        assert_eq!(page.value.len(), 1);
        assert_eq!(page.next_link, Some(format!("{}/page2", server.uri())));
    }
}
