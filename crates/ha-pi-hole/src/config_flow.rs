//! Config flow to configure the Pi-hole integration
//!
//! ```text
//! user ──submit──► duplicate (host, location)? ──► abort already_configured
//!                  │
//!                  try_connect ── ok ──────────► create_entry
//!                  ├─ invalid_auth ────────────► api_key ──submit──► try_connect ...
//!                  └─ cannot_connect ──────────► user (prefilled, base error)
//!
//! reauth(entry data) ──► reauth_confirm ──submit──► try_connect
//!                                          ok ──► update entry, reload, abort reauth_successful
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use ha_config_entries::ConfigEntrySource;
use ha_data_entry_flow::{
    ConfigFlow, FieldType, FlowContext, FlowError, FlowErrors, FlowManager, FlowResponse,
    FlowResult, FormField, Schema, UserInput, BASE_ERROR_KEY,
};

use crate::api::{ApiFactory, DataResponse, HoleError, HoleParams};
use crate::config::ConnectionConfig;
use crate::constants::{
    CONF_API_KEY, CONF_HOST, CONF_LOCATION, CONF_NAME, CONF_PORT, CONF_SSL, CONF_VERIFY_SSL,
    DEFAULT_API_KEY, DEFAULT_LOCATION, DEFAULT_NAME, DEFAULT_PORT, DEFAULT_SSL,
    DEFAULT_VERIFY_SSL, DOMAIN,
};

pub const STEP_USER: &str = "user";
pub const STEP_API_KEY: &str = "api_key";
pub const STEP_REAUTH: &str = "reauth";
pub const STEP_REAUTH_CONFIRM: &str = "reauth_confirm";

pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_INVALID_AUTH: &str = "invalid_auth";

/// Handle a Pi-hole config flow
pub struct PiHoleFlowHandler {
    factory: Arc<dyn ApiFactory>,
    /// Settings collected so far
    config: Option<ConnectionConfig>,
}

impl PiHoleFlowHandler {
    pub fn new(factory: Arc<dyn ApiFactory>) -> Self {
        Self {
            factory,
            config: None,
        }
    }

    /// Handle a flow initiated by the user
    async fn step_user(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<UserInput>,
    ) -> Result<FlowResult, FlowError> {
        let mut errors = FlowErrors::new();

        if let Some(input) = &user_input {
            let config = ConnectionConfig {
                host: format!(
                    "{}:{}",
                    string_field(input, CONF_HOST)?,
                    port_field(input)?
                ),
                name: string_field(input, CONF_NAME)?,
                location: string_field(input, CONF_LOCATION)?,
                use_tls: bool_field(input, CONF_SSL)?,
                verify_tls: bool_field(input, CONF_VERIFY_SSL)?,
                api_key: Some(string_field(input, CONF_API_KEY)?),
            };
            debug!(host = %config.host, location = %config.location, "User input");

            ctx.abort_entries_match(&config.unique_match())?;

            errors = self.try_connect(&config).await;
            if errors.is_empty() {
                debug!("Connection verified, creating entry");
                return Ok(FlowResult::create_entry(config.name.clone(), config.to_data()));
            }

            debug!(?errors, "Connection test failed");
            self.config = Some(config);
            if errors.contains_key(CONF_API_KEY) {
                return Ok(api_key_form(STEP_API_KEY, errors));
            }
        }

        Ok(FlowResult::show_form(STEP_USER, user_schema(user_input.as_ref()))
            .errors(errors)
            .into())
    }

    /// Handle step to setup API key
    async fn step_api_key(&mut self, user_input: Option<UserInput>) -> Result<FlowResult, FlowError> {
        let mut errors = FlowErrors::new();

        if let Some(input) = &user_input {
            let mut config = self.held_config(STEP_API_KEY)?;
            config.api_key = Some(string_field(input, CONF_API_KEY)?);

            errors = self.try_connect(&config).await;
            let created = errors
                .is_empty()
                .then(|| FlowResult::create_entry(config.name.clone(), config.to_data()));
            self.config = Some(config);
            if let Some(created) = created {
                return Ok(created);
            }
        }

        Ok(api_key_form(STEP_API_KEY, errors))
    }

    /// Perform reauth upon an API authentication error
    async fn step_reauth(
        &mut self,
        ctx: &FlowContext,
        entry_data: Option<UserInput>,
    ) -> Result<FlowResult, FlowError> {
        let data: HashMap<String, Value> = entry_data.unwrap_or_default().into_iter().collect();
        let config = ConnectionConfig::from_data(&data).map_err(|e| FlowError::InvalidInput {
            field: "entry_data".to_string(),
            message: e.to_string(),
        })?;
        self.config = Some(config);
        self.step_reauth_confirm(ctx, None).await
    }

    /// Perform reauth confirm upon an API authentication error
    async fn step_reauth_confirm(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<UserInput>,
    ) -> Result<FlowResult, FlowError> {
        let mut errors = FlowErrors::new();
        let mut config = self.held_config(STEP_REAUTH_CONFIRM)?;

        if let Some(input) = &user_input {
            let api_key = string_field(input, CONF_API_KEY)?;
            config.api_key = Some(api_key.clone());
            self.config = Some(config.clone());

            errors = self.try_connect(&config).await;
            if errors.is_empty() {
                let entry = ctx.reauth_entry()?;
                let mut data = entry.data.clone();
                data.insert(CONF_API_KEY.to_string(), Value::from(api_key));
                return ctx.update_reload_and_abort(&entry, data).await;
            }
        }

        Ok(FlowResult::show_form(STEP_REAUTH_CONFIRM, api_key_schema())
            .errors(errors)
            .placeholder(CONF_HOST, config.host.as_str())
            .placeholder(CONF_LOCATION, config.location.as_str())
            .into())
    }

    fn held_config(&self, step_id: &str) -> Result<ConnectionConfig, FlowError> {
        self.config
            .clone()
            .ok_or_else(|| FlowError::UnknownStep(step_id.to_string()))
    }

    /// Make one request against the Pi-hole and classify the outcome
    ///
    /// Empty on success, otherwise a single error keyed by `base`
    /// (`cannot_connect`) or by `api_key` (`invalid_auth`).
    async fn try_connect(&self, config: &ConnectionConfig) -> FlowErrors {
        debug!("config details: Host({})", config.host);

        let outcome = match self.factory.create(HoleParams::from(config)) {
            Ok(pi_hole) => {
                debug!("Testing the connection to {}", pi_hole.base_url());
                pi_hole.get_data().await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(DataResponse::Record(summary)) => {
                debug!(?summary, "Pi-hole returned a data record");
                FlowErrors::new()
            }
            Ok(DataResponse::AuthRequired) => {
                debug!("Pi-hole did not return a data record");
                error(CONF_API_KEY, ERROR_INVALID_AUTH)
            }
            Err(HoleError::Connection(err)) => {
                debug!("Connection failed: {}", err);
                error(BASE_ERROR_KEY, ERROR_CANNOT_CONNECT)
            }
            Err(HoleError::Api(err)) => {
                debug!("Connection failed: {}", err);
                error(BASE_ERROR_KEY, ERROR_CANNOT_CONNECT)
            }
        }
    }
}

#[async_trait]
impl ConfigFlow for PiHoleFlowHandler {
    async fn async_step(
        &mut self,
        ctx: &FlowContext,
        step_id: &str,
        input: Option<UserInput>,
    ) -> Result<FlowResult, FlowError> {
        match step_id {
            STEP_USER => self.step_user(ctx, input).await,
            STEP_API_KEY => self.step_api_key(input).await,
            STEP_REAUTH => self.step_reauth(ctx, input).await,
            STEP_REAUTH_CONFIRM => self.step_reauth_confirm(ctx, input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }
}

/// Start a reauth flow for an entry whose credentials stopped working
///
/// Fails with [`FlowError::AlreadyInProgress`] while another reauth flow
/// for the same entry is open.
pub async fn async_start_reauth(
    flows: &FlowManager,
    entry_id: &str,
) -> Result<FlowResponse, FlowError> {
    let entry = flows
        .entries()
        .get(entry_id)
        .ok_or_else(|| FlowError::UnknownEntry(entry_id.to_string()))?;

    if let Some(flow_id) = flows.flow_for_entry(DOMAIN, ConfigEntrySource::Reauth, entry_id) {
        return Err(FlowError::AlreadyInProgress(flow_id));
    }

    flows
        .async_init(
            DOMAIN,
            ConfigEntrySource::Reauth,
            Some(entry.entry_id),
            Some(entry.data.into_iter().collect()),
        )
        .await
}

/// Primary form, prefilled from a previous submission when there is one
fn user_schema(previous: Option<&UserInput>) -> Schema {
    let prior = |key: &str, fallback: Value| {
        previous
            .and_then(|input| input.get(key).cloned())
            .unwrap_or(fallback)
    };

    Schema::new()
        .field(
            FormField::required(CONF_HOST, FieldType::String)
                .with_default(prior(CONF_HOST, Value::from(""))),
        )
        .field(
            FormField::required(CONF_PORT, FieldType::Integer)
                .with_default(prior(CONF_PORT, Value::from(DEFAULT_PORT))),
        )
        .field(
            FormField::required(CONF_NAME, FieldType::String)
                .with_default(prior(CONF_NAME, Value::from(DEFAULT_NAME))),
        )
        .field(
            FormField::required(CONF_LOCATION, FieldType::String)
                .with_default(prior(CONF_LOCATION, Value::from(DEFAULT_LOCATION))),
        )
        .field(
            FormField::required(CONF_API_KEY, FieldType::String)
                .with_default(prior(CONF_API_KEY, Value::from(DEFAULT_API_KEY))),
        )
        .field(
            FormField::required(CONF_SSL, FieldType::Boolean)
                .with_default(prior(CONF_SSL, Value::from(DEFAULT_SSL))),
        )
        .field(
            FormField::required(CONF_VERIFY_SSL, FieldType::Boolean)
                .with_default(prior(CONF_VERIFY_SSL, Value::from(DEFAULT_VERIFY_SSL))),
        )
}

fn api_key_schema() -> Schema {
    Schema::new().field(FormField::required(CONF_API_KEY, FieldType::String))
}

fn api_key_form(step_id: &str, errors: FlowErrors) -> FlowResult {
    FlowResult::show_form(step_id, api_key_schema())
        .errors(errors)
        .into()
}

fn error(key: &str, kind: &str) -> FlowErrors {
    FlowErrors::from([(key.to_string(), kind.to_string())])
}

fn missing(key: &str, expected: &str) -> FlowError {
    FlowError::InvalidInput {
        field: key.to_string(),
        message: format!("expected {expected}"),
    }
}

fn string_field(input: &UserInput, key: &str) -> Result<String, FlowError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(key, "str"))
}

fn bool_field(input: &UserInput, key: &str) -> Result<bool, FlowError> {
    input
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| missing(key, "bool"))
}

fn port_field(input: &UserInput) -> Result<i64, FlowError> {
    input
        .get(CONF_PORT)
        .and_then(Value::as_i64)
        .ok_or_else(|| missing(CONF_PORT, "int"))
}
