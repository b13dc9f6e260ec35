//! In-memory management system
//!
//! Behaves like the SMC for the calls the provisioning flow makes, with knobs
//! to inject the failures the flow has to survive.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::api::{DynamicEngineSpec, ElementRef, ManagementSystem, TaskProgress};
use crate::{SmcError, SmcResult};

/// How policy upload tasks progress
#[derive(Clone, Debug)]
pub enum UploadScript {
    /// Report `steps` in-progress polls, then succeed
    Succeed { steps: u8 },
    /// Finish unsuccessfully with the given last message
    Fail { message: String },
    /// Never finish
    Hang,
}

#[derive(Debug)]
struct Engine {
    href: String,
    referenced: bool,
    gateway_routes: usize,
    licensed: bool,
}

#[derive(Debug)]
struct State {
    reject_login: bool,
    logged_in: bool,
    logins: usize,
    logouts: usize,
    next_id: u64,
    engines: HashMap<String, Engine>,
    locations: HashSet<String>,
    policies: HashSet<String>,
    engine_creations: usize,
    deletes: HashMap<String, usize>,
    reject_creation: bool,
    rejected_locations: HashSet<String>,
    fail_license: bool,
    upload_script: UploadScript,
    task_polls: usize,
}

#[derive(Debug)]
pub struct InMemoryManagementSystem {
    state: Mutex<State>,
}

impl InMemoryManagementSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                reject_login: false,
                logged_in: false,
                logins: 0,
                logouts: 0,
                next_id: 1,
                engines: HashMap::new(),
                locations: HashSet::new(),
                policies: HashSet::new(),
                engine_creations: 0,
                deletes: HashMap::new(),
                reject_creation: false,
                rejected_locations: HashSet::new(),
                fail_license: false,
                upload_script: UploadScript::Succeed { steps: 1 },
                task_polls: 0,
            }),
        }
    }

    /// Initial contact payload generated for an engine
    pub fn initial_contact_for(name: &str) -> Vec<u8> {
        format!("#initial contact for {}\nssh_enabled=true\n", name).into_bytes()
    }

    /// Seed an engine as if created out of band
    pub fn insert_engine(&self, name: &str) {
        let mut state = self.state.lock();
        let href = format!("memory://smc/elements/single_fw/{}", state.next_id);
        state.next_id += 1;
        state.engines.insert(
            name.to_string(),
            Engine { href, referenced: false, gateway_routes: 0, licensed: false },
        );
    }

    pub fn reject_login(&self) {
        self.state.lock().reject_login = true;
    }

    pub fn reject_engine_creation(&self) {
        self.state.lock().reject_creation = true;
    }

    pub fn reject_location(&self, name: &str) {
        self.state.lock().rejected_locations.insert(name.to_string());
    }

    pub fn fail_license_binding(&self) {
        self.state.lock().fail_license = true;
    }

    pub fn mark_referenced(&self, name: &str) {
        if let Some(engine) = self.state.lock().engines.get_mut(name) {
            engine.referenced = true;
        }
    }

    pub fn script_upload(&self, script: UploadScript) {
        self.state.lock().upload_script = script;
    }

    pub fn engine_exists(&self, name: &str) -> bool {
        self.state.lock().engines.contains_key(name)
    }

    pub fn is_licensed(&self, name: &str) -> bool {
        self.state.lock().engines.get(name).map(|e| e.licensed).unwrap_or(false)
    }

    pub fn gateway_routes(&self, name: &str) -> usize {
        self.state.lock().engines.get(name).map(|e| e.gateway_routes).unwrap_or(0)
    }

    pub fn policy_exists(&self, name: &str) -> bool {
        self.state.lock().policies.contains(name)
    }

    pub fn engine_creations(&self) -> usize {
        self.state.lock().engine_creations
    }

    /// Number of delete attempts made against an existing engine of this name
    pub fn delete_calls(&self, name: &str) -> usize {
        self.state.lock().deletes.get(name).copied().unwrap_or(0)
    }

    pub fn task_polls(&self) -> usize {
        self.state.lock().task_polls
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.lock().logged_in
    }

    pub fn logins(&self) -> usize {
        self.state.lock().logins
    }

    pub fn logouts(&self) -> usize {
        self.state.lock().logouts
    }

    fn session(&self) -> SmcResult<parking_lot::MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.logged_in {
            Ok(state)
        } else {
            Err(SmcError::Auth("no open SMC session".into()))
        }
    }

    fn engine_name_by_href(state: &State, href: &str) -> Option<String> {
        state
            .engines
            .iter()
            .find(|(_, e)| href == e.href || href.starts_with(&format!("{}/", e.href)))
            .map(|(name, _)| name.clone())
    }
}

impl Default for InMemoryManagementSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ManagementSystem for InMemoryManagementSystem {
    async fn login(&self) -> SmcResult<()> {
        let mut state = self.state.lock();
        state.logins += 1;
        if state.reject_login {
            return Err(SmcError::Auth("Login failed: invalid authentication key".into()));
        }
        state.logged_in = true;
        Ok(())
    }

    async fn logout(&self) -> SmcResult<()> {
        let mut state = self.state.lock();
        state.logged_in = false;
        state.logouts += 1;
        Ok(())
    }

    async fn resolve_location(&self, name: &str) -> SmcResult<ElementRef> {
        let mut state = self.session()?;
        if state.rejected_locations.contains(name) {
            return Err(SmcError::CreateFailed { name: name.to_string(), message: "invalid location".into() });
        }
        state.locations.insert(name.to_string());
        Ok(ElementRef::new(name, format!("memory://smc/elements/location/{}", name)))
    }

    async fn create_dynamic_engine(&self, spec: &DynamicEngineSpec) -> SmcResult<ElementRef> {
        let mut state = self.session()?;
        if state.reject_creation {
            return Err(SmcError::CreateFailed { name: spec.name.clone(), message: "creation rejected".into() });
        }
        if state.engines.contains_key(&spec.name) {
            return Err(SmcError::CreateFailed {
                name: spec.name.clone(),
                message: "Element name is already used".into(),
            });
        }
        let href = format!("memory://smc/elements/single_fw/{}", state.next_id);
        state.next_id += 1;
        state.engine_creations += 1;
        state.engines.insert(
            spec.name.clone(),
            Engine { href: href.clone(), referenced: false, gateway_routes: 0, licensed: false },
        );
        Ok(ElementRef::new(spec.name.clone(), href))
    }

    async fn find_engine(&self, name: &str) -> SmcResult<Option<ElementRef>> {
        let state = self.session()?;
        Ok(state.engines.get(name).map(|e| ElementRef::new(name, e.href.clone())))
    }

    async fn delete_engine(&self, engine: &ElementRef) -> SmcResult<()> {
        let mut state = self.session()?;
        let name = match Self::engine_name_by_href(&state, &engine.href) {
            Some(name) => name,
            None => return Err(SmcError::NotFound(engine.name.clone())),
        };
        *state.deletes.entry(name.clone()).or_insert(0) += 1;

        if state.engines.get(&name).map(|e| e.referenced).unwrap_or(false) {
            return Err(SmcError::DeleteFailed {
                name,
                message: "Element is referenced by another element".into(),
            });
        }
        state.engines.remove(&name);
        Ok(())
    }

    async fn classify_routes(&self, engine: &ElementRef, interface_id: u32, _classid: &str) -> SmcResult<usize> {
        let mut state = self.session()?;
        let name = Self::engine_name_by_href(&state, &engine.href)
            .ok_or_else(|| SmcError::NotFound(engine.name.clone()))?;
        // One dynamic network on interface 0
        let updated = if interface_id == 0 { 1 } else { 0 };
        if let Some(e) = state.engines.get_mut(&name) {
            e.gateway_routes = updated;
        }
        Ok(updated)
    }

    async fn primary_node(&self, engine: &ElementRef) -> SmcResult<ElementRef> {
        let _state = self.session()?;
        Ok(ElementRef::new(format!("{} node 1", engine.name), format!("{}/node/1", engine.href)))
    }

    async fn bind_license(&self, node: &ElementRef) -> SmcResult<()> {
        let mut state = self.session()?;
        if state.fail_license {
            return Err(SmcError::Api { status: 400, message: "No license available".into() });
        }
        let name = Self::engine_name_by_href(&state, &node.href)
            .ok_or_else(|| SmcError::NotFound(node.name.clone()))?;
        if let Some(e) = state.engines.get_mut(&name) {
            e.licensed = true;
        }
        Ok(())
    }

    async fn initial_contact(&self, node: &ElementRef) -> SmcResult<Vec<u8>> {
        let state = self.session()?;
        let name = Self::engine_name_by_href(&state, &node.href)
            .ok_or_else(|| SmcError::NotFound(node.name.clone()))?;
        Ok(Self::initial_contact_for(&name))
    }

    async fn get_or_create_policy(&self, name: &str) -> SmcResult<ElementRef> {
        let mut state = self.session()?;
        state.policies.insert(name.to_string());
        Ok(ElementRef::new(name, format!("memory://smc/elements/fw_policy/{}", name)))
    }

    async fn upload_policy(&self, policy: &ElementRef, engine_name: &str) -> SmcResult<ElementRef> {
        let mut state = self.session()?;
        state.task_polls = 0;
        Ok(ElementRef::new(
            format!("upload {} to {}", policy.name, engine_name),
            "memory://smc/task/1".to_string(),
        ))
    }

    async fn task_progress(&self, _task: &ElementRef) -> SmcResult<TaskProgress> {
        let mut state = self.session()?;
        state.task_polls += 1;
        let poll = state.task_polls;

        Ok(match state.upload_script.clone() {
            UploadScript::Succeed { steps } if poll <= steps as usize => TaskProgress {
                progress: ((poll * 100) / (steps as usize + 1)) as u8,
                in_progress: true,
                success: false,
                last_message: String::new(),
            },
            UploadScript::Succeed { .. } => TaskProgress {
                progress: 100,
                in_progress: false,
                success: true,
                last_message: "Upload and installation completed".into(),
            },
            UploadScript::Fail { message } => TaskProgress {
                progress: 100,
                in_progress: false,
                success: false,
                last_message: message,
            },
            UploadScript::Hang => TaskProgress {
                progress: 10,
                in_progress: true,
                success: false,
                last_message: String::new(),
            },
        })
    }
}
