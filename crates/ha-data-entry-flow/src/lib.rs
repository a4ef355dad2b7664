//! Data Entry Flows
//!
//! Step-based dialogues that collect configuration from a user and end in a
//! config entry. An integration implements [`ConfigFlow`]; the
//! [`FlowManager`] runs it, validates each submission against the
//! [`Schema`] of the form it answers, and persists created entries.
//!
//! ```text
//! async_init ──► step(None) ──► Form ──► async_configure(input) ──► step(Some)
//!                                ▲                                     │
//!                                └──────────── Form ◄──────────────────┤
//!                                              CreateEntry / Abort ◄───┘
//! ```

pub mod error;
pub mod flow;
pub mod manager;
pub mod result;
pub mod schema;

pub use error::FlowError;
pub use flow::{ConfigFlow, FlowContext};
pub use manager::{ConfigFlowHandler, FlowFactory, FlowManager};
pub use result::{CreateEntry, FlowErrors, FlowResponse, FlowResult, ShowForm, BASE_ERROR_KEY};
pub use schema::{FieldType, FormField, Schema};

/// A submitted (or prefilled) form as a field name to value mapping
pub type UserInput = serde_json::Map<String, serde_json::Value>;
