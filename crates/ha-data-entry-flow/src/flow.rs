//! Config flow trait and the context a running flow sees

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntrySource, ConfigEntryUpdate};

use crate::error::FlowError;
use crate::result::FlowResult;
use crate::UserInput;

/// A single integration's config flow
///
/// The manager calls [`ConfigFlow::async_step`] with the step id of the form
/// it last showed. `input` is `None` when the form should only be rendered,
/// and the schema-validated submission otherwise. For the `reauth` step
/// `input` carries the data of the entry being reauthenticated.
#[async_trait]
pub trait ConfigFlow: Send {
    async fn async_step(
        &mut self,
        ctx: &FlowContext,
        step_id: &str,
        input: Option<UserInput>,
    ) -> Result<FlowResult, FlowError>;
}

/// What a running flow knows about itself and the entries around it
#[derive(Clone)]
pub struct FlowContext {
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    pub source: ConfigEntrySource,
    /// Entry being reauthenticated or reconfigured
    pub entry_id: Option<String>,
    pub entries: Arc<ConfigEntries>,
}

impl FlowContext {
    /// Abort with `already_configured` if an entry of this domain already
    /// carries every key/value of `matcher` in its data
    pub fn abort_entries_match(&self, matcher: &HashMap<String, Value>) -> Result<(), FlowError> {
        if self.entries.entries_match(&self.handler, matcher) {
            debug!(flow_id = %self.flow_id, "Matching entry exists, aborting");
            return Err(FlowError::Abort("already_configured".to_string()));
        }
        Ok(())
    }

    /// The entry this reauth flow was started for
    pub fn reauth_entry(&self) -> Result<ConfigEntry, FlowError> {
        let entry_id = self
            .entry_id
            .as_deref()
            .ok_or_else(|| FlowError::UnknownEntry(String::new()))?;
        self.entries
            .get(entry_id)
            .ok_or_else(|| FlowError::UnknownEntry(entry_id.to_string()))
    }

    /// Replace the entry's data, reload it and end the flow
    ///
    /// A failing reload leaves the entry in its error state; the flow still
    /// finishes because the new data has been stored.
    pub async fn update_reload_and_abort(
        &self,
        entry: &ConfigEntry,
        data: HashMap<String, Value>,
    ) -> Result<FlowResult, FlowError> {
        self.entries
            .update(&entry.entry_id, ConfigEntryUpdate::new().data(data))
            .await?;

        if let Err(err) = self.entries.reload(&entry.entry_id).await {
            warn!("Reload of {} after {} failed: {}", entry.entry_id, self.source.as_str(), err);
        }

        let reason = match self.source {
            ConfigEntrySource::Reconfigure => "reconfigure_successful",
            _ => "reauth_successful",
        };
        Ok(FlowResult::abort(reason))
    }
}
