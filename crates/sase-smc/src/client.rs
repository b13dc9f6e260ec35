//! SMC REST client
//!
//! Session state lives in the reqwest cookie store; `login` must be called
//! before any element call and `logout` releases the server-side session.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ETAG, IF_MATCH, LOCATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};
use url::Url;

use crate::api::{DynamicEngineSpec, ElementRef, ManagementSystem, TaskProgress};
use crate::{SmcConfig, SmcError, SmcResult};

const ENGINE_TYPE: &str = "single_fw";
const POLICY_TYPE: &str = "fw_policy";
const POLICY_TEMPLATE_TYPE: &str = "fw_template_policy";
const LOCATION_TYPE: &str = "location";
const DEFAULT_POLICY_TEMPLATE: &str = "Firewall Inspection Template";

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    result: Vec<ElementRef>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

impl ErrorBody {
    fn describe(self, fallback: &str) -> String {
        let mut parts: Vec<String> = self.message.into_iter().collect();
        parts.extend(self.details);
        if parts.is_empty() {
            fallback.to_string()
        } else {
            parts.join(": ")
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskFollower {
    follower: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    in_progress: bool,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    last_message: Option<String>,
}

/// HTTP implementation of [`ManagementSystem`]
#[derive(Debug)]
pub struct SmcClient {
    config: SmcConfig,
    root: Url,
    http_client: reqwest::Client,
    logged_in: AtomicBool,
}

impl SmcClient {
    pub fn new(config: SmcConfig) -> SmcResult<Self> {
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SmcError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            root: config.api_root()?,
            config,
            http_client,
            logged_in: AtomicBool::new(false),
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn element_url(&self, element_type: &str) -> SmcResult<Url> {
        Ok(self.root.join(&format!("elements/{}", element_type))?)
    }

    fn ensure_session(&self) -> SmcResult<()> {
        if self.is_logged_in() {
            Ok(())
        } else {
            Err(SmcError::Auth("no open SMC session".into()))
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client.request(method, url)
    }

    /// Send and map non-success responses to `SmcError::Api`
    async fn send(&self, request: RequestBuilder) -> SmcResult<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(Self::api_error(response).await)
    }

    async fn api_error(response: Response) -> SmcError {
        let status = response.status();
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        let message = body.describe(status.canonical_reason().unwrap_or("request failed"));
        if status == StatusCode::NOT_FOUND {
            SmcError::NotFound(message)
        } else {
            SmcError::Api { status: status.as_u16(), message }
        }
    }

    async fn search(&self, element_type: &str, name: &str) -> SmcResult<Option<ElementRef>> {
        let mut url = self.element_url(element_type)?;
        url.query_pairs_mut()
            .append_pair("filter", name)
            .append_pair("exact_match", "true");

        let found: SearchResult = self.send(self.request(Method::GET, url)).await?.json().await?;
        Ok(found.result.into_iter().find(|e| e.name == name))
    }

    async fn create_element(&self, element_type: &str, name: &str, body: &Value) -> SmcResult<ElementRef> {
        let url = self.element_url(element_type)?;
        let response = self.request(Method::POST, url).json(body).send().await?;

        if !response.status().is_success() {
            return Err(match Self::api_error(response).await {
                SmcError::Api { message, .. } | SmcError::NotFound(message) => {
                    SmcError::CreateFailed { name: name.to_string(), message }
                }
                other => other,
            });
        }

        let href = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| SmcError::CreateFailed {
                name: name.to_string(),
                message: "response carried no element location".into(),
            })?;
        Ok(ElementRef::new(name, href))
    }

    async fn get_with_etag(&self, href: &str) -> SmcResult<(Value, Option<String>)> {
        let response = self.send(self.request(Method::GET, Url::parse(href)?)).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((response.json().await?, etag))
    }

    fn engine_body(spec: &DynamicEngineSpec) -> Value {
        let nic = spec.interface_id.to_string();
        let mut body = json!({
            "name": spec.name,
            "nodes": [{
                "firewall_node": {
                    "activate_test": true,
                    "disabled": false,
                    "name": format!("{} node 1", spec.name),
                    "nodeid": 1,
                }
            }],
            "physicalInterfaces": [{
                "physical_interface": {
                    "interface_id": nic,
                    "interfaces": [{
                        "single_node_interface": {
                            "address": "First DHCP Interface ip",
                            "dynamic": true,
                            "dynamic_index": spec.dynamic_index,
                            "nicid": nic,
                            "primary_mgt": true,
                            "outgoing": true,
                            "auth_request": true,
                        }
                    }]
                }
            }],
            "default_nat": spec.default_nat,
            "domain_server_address": [],
        });
        if let Some(ref location) = spec.location {
            body["location_ref"] = json!(location.href);
        }
        body
    }
}

/// Set `classid` on the first routing node of every network under the interface
fn classify_routing_tree(tree: &mut Value, interface_id: u32, classid: &str) -> usize {
    let nic = interface_id.to_string();
    let mut updated = 0;

    let interfaces = match tree.get_mut("routing_node").and_then(Value::as_array_mut) {
        Some(interfaces) => interfaces,
        None => return 0,
    };

    for interface in interfaces.iter_mut() {
        if interface.get("nic_id").and_then(Value::as_str) != Some(nic.as_str()) {
            continue;
        }
        let networks = match interface.get_mut("routing_node").and_then(Value::as_array_mut) {
            Some(networks) => networks,
            None => continue,
        };
        for network in networks.iter_mut() {
            if let Some(first) = network
                .get_mut("routing_node")
                .and_then(Value::as_array_mut)
                .and_then(|nodes| nodes.first_mut())
            {
                first["dynamic_classid"] = json!(classid);
                updated += 1;
            }
        }
    }
    updated
}

#[async_trait]
impl ManagementSystem for SmcClient {
    #[instrument(skip(self), fields(address = %self.config.address))]
    async fn login(&self) -> SmcResult<()> {
        let url = self.root.join("login")?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "authenticationkey": self.config.api_key }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(SmcError::Auth(format!("login rejected with status {}", status)));
        }
        self.logged_in.store(true, Ordering::SeqCst);
        debug!("SMC session opened");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> SmcResult<()> {
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let url = self.root.join("logout")?;
        self.send(self.request(Method::PUT, url)).await?;
        debug!("SMC session closed");
        Ok(())
    }

    async fn resolve_location(&self, name: &str) -> SmcResult<ElementRef> {
        self.ensure_session()?;
        if let Some(location) = self.search(LOCATION_TYPE, name).await? {
            return Ok(location);
        }
        debug!("Creating location {}", name);
        self.create_element(LOCATION_TYPE, name, &json!({ "name": name })).await
    }

    #[instrument(skip(self, spec), fields(engine = %spec.name))]
    async fn create_dynamic_engine(&self, spec: &DynamicEngineSpec) -> SmcResult<ElementRef> {
        self.ensure_session()?;
        self.create_element(ENGINE_TYPE, &spec.name, &Self::engine_body(spec)).await
    }

    async fn find_engine(&self, name: &str) -> SmcResult<Option<ElementRef>> {
        self.ensure_session()?;
        self.search(ENGINE_TYPE, name).await
    }

    #[instrument(skip(self), fields(engine = %engine.name))]
    async fn delete_engine(&self, engine: &ElementRef) -> SmcResult<()> {
        self.ensure_session()?;
        let (_, etag) = self.get_with_etag(&engine.href).await?;

        let mut request = self.request(Method::DELETE, Url::parse(&engine.href)?);
        if let Some(etag) = etag {
            request = request.header(IF_MATCH, etag);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(match Self::api_error(response).await {
            SmcError::Api { message, .. } => SmcError::DeleteFailed { name: engine.name.clone(), message },
            other => other,
        })
    }

    async fn classify_routes(&self, engine: &ElementRef, interface_id: u32, classid: &str) -> SmcResult<usize> {
        self.ensure_session()?;
        let routing_href = format!("{}/routing", engine.href.trim_end_matches('/'));
        let (mut tree, etag) = self.get_with_etag(&routing_href).await?;

        let updated = classify_routing_tree(&mut tree, interface_id, classid);
        if updated == 0 {
            return Ok(0);
        }

        let mut request = self.request(Method::PUT, Url::parse(&routing_href)?).json(&tree);
        if let Some(etag) = etag {
            request = request.header(IF_MATCH, etag);
        }
        self.send(request).await?;
        Ok(updated)
    }

    async fn primary_node(&self, engine: &ElementRef) -> SmcResult<ElementRef> {
        self.ensure_session()?;
        let url = Url::parse(&format!("{}/node", engine.href.trim_end_matches('/')))?;
        let nodes: SearchResult = self.send(self.request(Method::GET, url)).await?.json().await?;
        nodes
            .result
            .into_iter()
            .next()
            .ok_or_else(|| SmcError::NotFound(format!("nodes of engine {}", engine.name)))
    }

    async fn bind_license(&self, node: &ElementRef) -> SmcResult<()> {
        self.ensure_session()?;
        let url = Url::parse(&format!("{}/bind", node.href.trim_end_matches('/')))?;
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn initial_contact(&self, node: &ElementRef) -> SmcResult<Vec<u8>> {
        self.ensure_session()?;
        let mut url = Url::parse(&format!("{}/initial_contact", node.href.trim_end_matches('/')))?;
        url.query_pairs_mut().append_pair("enable_ssh", "true");

        let response = self
            .send(self.request(Method::POST, url).header(ACCEPT, "text/plain"))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_or_create_policy(&self, name: &str) -> SmcResult<ElementRef> {
        self.ensure_session()?;
        if let Some(policy) = self.search(POLICY_TYPE, name).await? {
            return Ok(policy);
        }
        let template = self
            .search(POLICY_TEMPLATE_TYPE, DEFAULT_POLICY_TEMPLATE)
            .await?
            .ok_or_else(|| SmcError::NotFound(format!("policy template {}", DEFAULT_POLICY_TEMPLATE)))?;

        debug!("Creating firewall policy {} from {}", name, template.name);
        self.create_element(POLICY_TYPE, name, &json!({ "name": name, "template": template.href }))
            .await
    }

    #[instrument(skip(self), fields(policy = %policy.name))]
    async fn upload_policy(&self, policy: &ElementRef, engine_name: &str) -> SmcResult<ElementRef> {
        self.ensure_session()?;
        let mut url = Url::parse(&format!("{}/upload", policy.href.trim_end_matches('/')))?;
        url.query_pairs_mut().append_pair("filter", engine_name);

        let task: TaskFollower = self.send(self.request(Method::POST, url)).await?.json().await?;
        Ok(ElementRef::new(format!("upload {} to {}", policy.name, engine_name), task.follower))
    }

    async fn task_progress(&self, task: &ElementRef) -> SmcResult<TaskProgress> {
        self.ensure_session()?;
        let status: TaskStatus = self
            .send(self.request(Method::GET, Url::parse(&task.href)?))
            .await?
            .json()
            .await?;

        Ok(TaskProgress {
            progress: status.progress.min(100),
            in_progress: status.in_progress,
            success: status.success,
            last_message: status.last_message.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn logged_in_client(server: &MockServer) -> SmcClient {
        Mock::given(method("POST"))
            .and(path("/6.10/login"))
            .and(body_json(json!({ "authenticationkey": "key" })))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "JSESSIONID=abc; Path=/"))
            .mount(server)
            .await;

        let client = SmcClient::new(SmcConfig::new(&server.uri(), "key").unwrap()).unwrap();
        client.login().await.unwrap();
        client
    }

    #[test]
    fn test_classify_routing_tree() {
        let mut tree = json!({
            "routing_node": [
                {
                    "nic_id": "0",
                    "routing_node": [
                        { "name": "net-a", "routing_node": [{ "name": "gw" }] },
                        { "name": "net-b", "routing_node": [] }
                    ]
                },
                {
                    "nic_id": "1",
                    "routing_node": [{ "name": "net-c", "routing_node": [{ "name": "gw" }] }]
                }
            ]
        });

        assert_eq!(classify_routing_tree(&mut tree, 0, "gateway"), 1);
        assert_eq!(tree["routing_node"][0]["routing_node"][0]["routing_node"][0]["dynamic_classid"], "gateway");
        assert!(tree["routing_node"][1]["routing_node"][0]["routing_node"][0].get("dynamic_classid").is_none());
    }

    #[tokio::test]
    async fn test_calls_require_session() {
        let client = SmcClient::new(SmcConfig::new("http://127.0.0.1:9", "key").unwrap()).unwrap();
        let err = client.find_engine("rg1").await.unwrap_err();
        assert!(matches!(err, SmcError::Auth(_)));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/6.10/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SmcClient::new(SmcConfig::new(&server.uri(), "bad").unwrap()).unwrap();
        assert!(matches!(client.login().await, Err(SmcError::Auth(_))));
        assert!(!client.is_logged_in());
    }

    #[tokio::test]
    async fn test_find_engine_exact_match() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/6.10/elements/single_fw"))
            .and(query_param("filter", "rg1"))
            .and(query_param("exact_match", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{ "name": "rg1", "href": format!("{}/6.10/elements/single_fw/7", server.uri()), "type": "single_fw" }]
            })))
            .mount(&server)
            .await;

        let engine = client.find_engine("rg1").await.unwrap().unwrap();
        assert!(engine.href.ends_with("/single_fw/7"));
    }

    #[tokio::test]
    async fn test_delete_engine_still_referenced() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;
        let href = format!("{}/6.10/elements/single_fw/7", server.uri());

        Mock::given(method("GET"))
            .and(path("/6.10/elements/single_fw/7"))
            .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"v1\"").set_body_json(json!({ "name": "rg1" })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/6.10/elements/single_fw/7"))
            .and(header("if-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Impossible to delete rg1",
                "details": ["Element is referenced by Policy"]
            })))
            .mount(&server)
            .await;

        let err = client.delete_engine(&ElementRef::new("rg1", href)).await.unwrap_err();
        match err {
            SmcError::DeleteFailed { name, message } => {
                assert_eq!(name, "rg1");
                assert!(message.contains("referenced"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_engine_returns_location() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;

        Mock::given(method("POST"))
            .and(path("/6.10/elements/single_fw"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", format!("{}/6.10/elements/single_fw/9", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        let engine = client.create_dynamic_engine(&DynamicEngineSpec::new("rg1")).await.unwrap();
        assert_eq!(engine.name, "rg1");
        assert!(engine.href.ends_with("/single_fw/9"));
    }

    #[tokio::test]
    async fn test_task_progress() {
        let server = MockServer::start().await;
        let client = logged_in_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/6.10/task/42/result"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "progress": 100,
                "in_progress": false,
                "success": false,
                "last_message": "Policy installation failed"
            })))
            .mount(&server)
            .await;

        let task = ElementRef::new("upload", format!("{}/6.10/task/42/result", server.uri()));
        let status = client.task_progress(&task).await.unwrap();
        assert!(!status.in_progress);
        assert!(!status.success);
        assert_eq!(status.last_message, "Policy installation failed");
    }
}
