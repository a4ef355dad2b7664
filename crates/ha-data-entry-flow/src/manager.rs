//! Config Flow Manager
//!
//! Tracks in-progress flows, validates submissions against the form each
//! flow last showed and turns finished flows into config entries.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntrySource};

use crate::error::FlowError;
use crate::flow::{ConfigFlow, FlowContext};
use crate::result::{FlowResponse, FlowResult};
use crate::schema::Schema;
use crate::UserInput;

/// Builds a fresh flow instance for a domain
pub type FlowFactory = Arc<dyn Fn() -> Box<dyn ConfigFlow> + Send + Sync>;

/// Active flow state
struct ActiveFlow {
    context: FlowContext,
    flow: Box<dyn ConfigFlow>,
    /// Step id of the form currently shown
    current_step: String,
    /// Schema of the form currently shown
    schema: Schema,
}

/// A registered flow
///
/// The context is kept outside the lock so in-progress flows can be
/// listed while one of their steps runs.
#[derive(Clone)]
struct FlowSlot {
    context: FlowContext,
    active: Arc<Mutex<ActiveFlow>>,
}

/// Manages configuration flows
///
/// Each flow is locked while one of its steps runs, so steps of the same
/// flow never overlap while independent flows progress concurrently.
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    factories: DashMap<String, FlowFactory>,
    flows: DashMap<String, FlowSlot>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            factories: DashMap::new(),
            flows: DashMap::new(),
        }
    }

    /// Register the config flow for a domain
    pub fn register(&self, domain: &str, factory: FlowFactory) {
        self.factories.insert(domain.to_string(), factory);
        debug!("Registered config flow for domain: {}", domain);
    }

    pub fn entries(&self) -> &Arc<ConfigEntries> {
        &self.entries
    }

    /// Start a flow
    ///
    /// The first step is chosen from `source`: `user` flows start at the
    /// `user` step, `reauth` flows at the `reauth` step with the existing
    /// entry's data as input.
    pub async fn async_init(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        entry_id: Option<String>,
        data: Option<UserInput>,
    ) -> Result<FlowResponse, FlowError> {
        let factory = self
            .factories
            .get(handler)
            .map(|f| f.value().clone())
            .ok_or_else(|| FlowError::UnknownHandler(handler.to_string()))?;

        let flow_id = Ulid::new().to_string();
        let step_id = source.as_str().to_string();
        info!(flow_id = %flow_id, handler, source = source.as_str(), "Starting config flow");

        let mut active = ActiveFlow {
            context: FlowContext {
                flow_id: flow_id.clone(),
                handler: handler.to_string(),
                source,
                entry_id,
                entries: self.entries.clone(),
            },
            flow: factory(),
            current_step: step_id.clone(),
            schema: Schema::new(),
        };

        let result = run_step(&mut active, &step_id, data).await?;
        self.finish_step(active, result).await
    }

    /// Submit input to the step a flow is waiting on
    pub async fn async_configure(
        &self,
        flow_id: &str,
        input: Option<UserInput>,
    ) -> Result<FlowResponse, FlowError> {
        let slot = self
            .flows
            .get(flow_id)
            .map(|f| f.value().clone())
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        let mut active = slot.active.lock().await;
        // A submission that waited on the lock may find the flow already finished
        if !self.is_registered(flow_id, &slot.active) {
            debug!(flow_id, "Flow finished while the submission waited");
            return Err(FlowError::UnknownFlow(flow_id.to_string()));
        }

        let input = input.map(|input| active.schema.validate(&input)).transpose()?;
        let step_id = active.current_step.clone();

        let result = run_step(&mut active, &step_id, input).await?;

        match result {
            FlowResult::Form(form) => {
                active.current_step = form.step_id.clone();
                active.schema = form.data_schema.clone();
                Ok(response(&active.context, FlowResult::Form(form), None))
            }
            finished => {
                self.flows.remove(flow_id);
                let context = active.context.clone();
                drop(active);
                self.complete(context, finished).await
            }
        }
    }

    /// Drop an in-progress flow
    pub fn async_abort(&self, flow_id: &str) -> Result<(), FlowError> {
        self.flows
            .remove(flow_id)
            .map(|_| debug!("Aborted flow {}", flow_id))
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    /// Summaries of in-progress flows
    pub fn async_progress(&self) -> Vec<serde_json::Value> {
        self.flows
            .iter()
            .map(|slot| {
                let context = &slot.context;
                let mut progress = serde_json::json!({
                    "flow_id": context.flow_id,
                    "handler": context.handler,
                    "context": {"source": context.source, "entry_id": context.entry_id},
                });
                // Omitted while a step runs
                if let Ok(active) = slot.active.try_lock() {
                    progress["step_id"] = serde_json::json!(active.current_step);
                }
                progress
            })
            .collect()
    }

    /// Id of an in-progress `handler` flow started from `source` for `entry_id`
    pub fn flow_for_entry(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        entry_id: &str,
    ) -> Option<String> {
        self.flows
            .iter()
            .find(|slot| {
                slot.context.handler == handler
                    && slot.context.source == source
                    && slot.context.entry_id.as_deref() == Some(entry_id)
            })
            .map(|slot| slot.key().clone())
    }

    fn is_registered(&self, flow_id: &str, active: &Arc<Mutex<ActiveFlow>>) -> bool {
        self.flows
            .get(flow_id)
            .is_some_and(|slot| Arc::ptr_eq(&slot.active, active))
    }

    async fn finish_step(
        &self,
        mut active: ActiveFlow,
        result: FlowResult,
    ) -> Result<FlowResponse, FlowError> {
        match result {
            FlowResult::Form(form) => {
                active.current_step = form.step_id.clone();
                active.schema = form.data_schema.clone();
                let context = active.context.clone();
                let response = response(&context, FlowResult::Form(form), None);
                self.flows.insert(
                    context.flow_id.clone(),
                    FlowSlot {
                        context,
                        active: Arc::new(Mutex::new(active)),
                    },
                );
                Ok(response)
            }
            finished => self.complete(active.context, finished).await,
        }
    }

    /// Persist a `create_entry` result and set the new entry up
    async fn complete(
        &self,
        context: FlowContext,
        result: FlowResult,
    ) -> Result<FlowResponse, FlowError> {
        let create = match result {
            FlowResult::CreateEntry(create) => create,
            other => return Ok(response(&context, other, None)),
        };

        let entry = ConfigEntry::new(&context.handler, &create.title)
            .with_data(create.data.clone())
            .with_source(context.source);
        let entry = self.entries.add(entry).await?;

        if let Err(err) = self.entries.setup(&entry.entry_id).await {
            warn!("Setup of new entry {} failed: {}", entry.entry_id, err);
        }

        Ok(response(
            &context,
            FlowResult::CreateEntry(create),
            Some(entry.entry_id),
        ))
    }
}

/// Run one step, mapping a requested abort to an `abort` result
async fn run_step(
    active: &mut ActiveFlow,
    step_id: &str,
    input: Option<UserInput>,
) -> Result<FlowResult, FlowError> {
    debug!(flow_id = %active.context.flow_id, step_id, "Running flow step");
    match active.flow.async_step(&active.context, step_id, input).await {
        Err(FlowError::Abort(reason)) => Ok(FlowResult::abort(reason)),
        other => other,
    }
}

fn response(context: &FlowContext, result: FlowResult, entry_id: Option<String>) -> FlowResponse {
    FlowResponse {
        flow_id: context.flow_id.clone(),
        handler: context.handler.clone(),
        result,
        entry_id,
    }
}

/// Trait for handling configuration flows
///
/// The surface API layers (REST, WebSocket) drive flows through.
#[async_trait]
pub trait ConfigFlowHandler: Send + Sync {
    /// Start a new user-initiated flow for an integration
    async fn start_flow(&self, handler: &str) -> Result<FlowResponse, FlowError>;

    /// Continue a flow with user input
    async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> Result<FlowResponse, FlowError>;

    /// Get list of active flows
    async fn list_flows(&self) -> Vec<serde_json::Value>;
}

#[async_trait]
impl ConfigFlowHandler for FlowManager {
    async fn start_flow(&self, handler: &str) -> Result<FlowResponse, FlowError> {
        self.async_init(handler, ConfigEntrySource::User, None, None)
            .await
    }

    async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> Result<FlowResponse, FlowError> {
        let input = match user_input {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(FlowError::InvalidInput {
                    field: "user_input".to_string(),
                    message: "expected a mapping".to_string(),
                })
            }
        };
        self.async_configure(flow_id, input).await
    }

    async fn list_flows(&self) -> Vec<serde_json::Value> {
        self.async_progress()
    }
}
