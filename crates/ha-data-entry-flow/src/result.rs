//! Flow step results

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::schema::Schema;

/// Error annotations keyed by field name, or `base` for the whole form.
/// Values are translation keys such as `cannot_connect`.
pub type FlowErrors = HashMap<String, String>;

/// Key used for errors that belong to the form rather than a field
pub const BASE_ERROR_KEY: &str = "base";

/// Outcome of a single flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show a form and wait for the next submission
    Form(ShowForm),
    /// Finish the flow by creating a config entry
    CreateEntry(CreateEntry),
    /// Finish the flow without creating anything
    Abort { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowForm {
    pub step_id: String,
    pub data_schema: Schema,
    pub errors: FlowErrors,
    pub description_placeholders: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateEntry {
    pub title: String,
    pub data: HashMap<String, Value>,
}

impl FlowResult {
    pub fn show_form(step_id: impl Into<String>, data_schema: Schema) -> ShowForm {
        ShowForm {
            step_id: step_id.into(),
            data_schema,
            errors: FlowErrors::new(),
            description_placeholders: HashMap::new(),
        }
    }

    pub fn create_entry(title: impl Into<String>, data: HashMap<String, Value>) -> Self {
        FlowResult::CreateEntry(CreateEntry {
            title: title.into(),
            data,
        })
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        FlowResult::Abort {
            reason: reason.into(),
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            FlowResult::Form(form) => Some(&form.step_id),
            _ => None,
        }
    }
}

impl ShowForm {
    pub fn errors(mut self, errors: FlowErrors) -> Self {
        self.errors = errors;
        self
    }

    pub fn placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.description_placeholders.insert(key.into(), value.into());
        self
    }
}

impl From<ShowForm> for FlowResult {
    fn from(form: ShowForm) -> Self {
        FlowResult::Form(form)
    }
}

/// A step result as returned to API consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowResponse {
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    #[serde(flatten)]
    pub result: FlowResult,
    /// Id of the config entry created by a `create_entry` result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}
