//! Common test utilities for the Pi-hole integration
//!
//! [`MockHole`] stands in for a real Pi-hole: tests decide whether it is
//! reachable and which password it accepts, then count how often it was
//! asked for data.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tempfile::TempDir;

use ha_config_entries::{ConfigEntries, ConfigEntry, Storage};
use ha_data_entry_flow::{FlowManager, FlowResponse, FlowResult, UserInput};
use ha_pi_hole::{
    register_integration, ApiFactory, DataResponse, HoleError, HoleParams, PiHoleApi,
    PiHoleIntegration, Summary,
};

/// A scriptable Pi-hole shared by every client built from it
pub struct MockHole {
    online: AtomicBool,
    /// Answer every request with an API error
    broken: AtomicBool,
    /// Time each request takes
    delay: RwLock<Duration>,
    /// Accepted password, `None` when the Pi-hole runs open
    password: RwLock<Option<String>>,
    summary: RwLock<Summary>,
    /// Number of `get_data` calls
    requests: AtomicUsize,
    /// Parameters of every client created
    created: RwLock<Vec<HoleParams>>,
}

impl MockHole {
    /// An open, reachable Pi-hole
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(true),
            broken: AtomicBool::new(false),
            delay: RwLock::new(Duration::ZERO),
            password: RwLock::new(None),
            summary: RwLock::new(sample_summary()),
            requests: AtomicUsize::new(0),
            created: RwLock::new(Vec::new()),
        })
    }

    /// A reachable Pi-hole protected by `password`
    pub fn with_password(password: &str) -> Arc<Self> {
        let hole = Self::new();
        hole.set_password(Some(password));
        hole
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write().unwrap() = delay;
    }

    pub fn set_password(&self, password: Option<&str>) {
        *self.password.write().unwrap() = password.map(str::to_string);
    }

    pub fn set_summary(&self, summary: Summary) {
        *self.summary.write().unwrap() = summary;
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<HoleParams> {
        self.created.read().unwrap().clone()
    }
}

struct MockClient {
    hole: Arc<MockHole>,
    params: HoleParams,
}

#[async_trait]
impl PiHoleApi for MockClient {
    fn base_url(&self) -> String {
        format!("http://{}/{}", self.params.host, self.params.location)
    }

    async fn get_data(&self) -> Result<DataResponse, HoleError> {
        self.hole.requests.fetch_add(1, Ordering::SeqCst);

        let delay = *self.hole.delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.hole.online.load(Ordering::SeqCst) {
            return Err(HoleError::Connection(format!(
                "{}: connection refused",
                self.params.host
            )));
        }
        if self.hole.broken.load(Ordering::SeqCst) {
            return Err(HoleError::Api(
                "summary returned HTTP 500 Internal Server Error".to_string(),
            ));
        }

        let accepted = self.hole.password.read().unwrap().clone();
        match accepted {
            Some(password) if self.params.password.as_deref() != Some(password.as_str()) => {
                Ok(DataResponse::AuthRequired)
            }
            _ => Ok(DataResponse::Record(self.hole.summary.read().unwrap().clone())),
        }
    }
}

/// A running Pi-hole integration backed by a temporary config dir
pub struct TestHarness {
    pub hole: Arc<MockHole>,
    pub entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
    pub integration: Arc<PiHoleIntegration>,
    _dir: TempDir,
}

impl TestHarness {
    pub fn new(hole: Arc<MockHole>) -> Self {
        Self::build(hole, |integration| integration.without_polling())
    }

    /// A harness whose loaded entries refresh every `interval`
    pub fn polling(hole: Arc<MockHole>, interval: Duration) -> Self {
        Self::build(hole, |integration| integration.with_update_interval(interval))
    }

    fn build(
        hole: Arc<MockHole>,
        configure: impl FnOnce(PiHoleIntegration) -> PiHoleIntegration,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(dir.path()))));
        let flows = Arc::new(FlowManager::new(entries.clone()));

        let factory: Arc<dyn ApiFactory> = Arc::new(SharedFactory(hole.clone()));
        let integration = register_integration(
            &flows,
            configure(PiHoleIntegration::new(&entries, factory.clone())),
            factory,
        );

        Self {
            hole,
            entries,
            flows,
            integration,
            _dir: dir,
        }
    }

    /// Add an entry without going through a flow
    pub async fn add_entry(&self, title: &str, data: Value) -> ConfigEntry {
        let entry = ConfigEntry::new("pi_hole_v6", title).with_data(data_map(data));
        self.entries.add(entry).await.unwrap()
    }
}

/// Hands out clients that all report to the same [`MockHole`]
pub struct SharedFactory(pub Arc<MockHole>);

impl ApiFactory for SharedFactory {
    fn create(&self, params: HoleParams) -> Result<Arc<dyn PiHoleApi>, HoleError> {
        self.0.created.write().unwrap().push(params.clone());
        Ok(Arc::new(MockClient {
            hole: self.0.clone(),
            params,
        }))
    }
}

pub fn sample_summary() -> Summary {
    serde_json::from_value(json!({
        "queries": {
            "total": 1200,
            "blocked": 300,
            "percent_blocked": 25.0,
            "unique_domains": 80,
            "forwarded": 600,
            "cached": 300
        },
        "clients": {"active": 4, "total": 9},
        "gravity": {"domains_being_blocked": 120000, "last_update": 1700000000}
    }))
    .unwrap()
}

pub fn input(value: Value) -> UserInput {
    value.as_object().cloned().unwrap()
}

pub fn data_map(value: Value) -> HashMap<String, Value> {
    input(value).into_iter().collect()
}

/// The primary form as a user would fill it in
pub fn user_input(host: &str, port: u16, api_key: &str) -> UserInput {
    input(json!({
        "host": host,
        "port": port,
        "name": "Pi-Hole",
        "location": "admin",
        "api_key": api_key,
        "ssl": false,
        "verify_ssl": true
    }))
}

/// In-progress reauth flows of `entry_id` as `(flow_id, step_id)`
pub fn reauth_flows(flows: &FlowManager, entry_id: &str) -> Vec<(String, Value)> {
    flows
        .async_progress()
        .into_iter()
        .filter(|flow| {
            flow["context"]["source"] == json!("reauth") && flow["context"]["entry_id"] == json!(entry_id)
        })
        .map(|flow| (flow["flow_id"].as_str().unwrap().to_string(), flow["step_id"].clone()))
        .collect()
}

pub fn form(response: &FlowResponse) -> &ha_data_entry_flow::ShowForm {
    match &response.result {
        FlowResult::Form(form) => form,
        other => panic!("expected a form, got {other:?}"),
    }
}

pub fn abort_reason(response: &FlowResponse) -> &str {
    match &response.result {
        FlowResult::Abort { reason } => reason,
        other => panic!("expected an abort, got {other:?}"),
    }
}
