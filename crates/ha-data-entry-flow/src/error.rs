//! Flow errors

use ha_config_entries::ConfigEntriesError;
use thiserror::Error;

/// Errors raised while driving a flow
///
/// [`FlowError::Abort`] is not a failure: a step returns it to end the flow
/// and the manager turns it into an `abort` result.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No config flow registered for {0}")]
    UnknownHandler(String),

    #[error("Flow not found: {0}")]
    UnknownFlow(String),

    #[error("Flow already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("Flow has no step {0}")]
    UnknownStep(String),

    #[error("Config entry not found: {0}")]
    UnknownEntry(String),

    #[error("Invalid value for '{field}': {message}")]
    InvalidInput { field: String, message: String },

    #[error("Flow aborted: {0}")]
    Abort(String),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}
