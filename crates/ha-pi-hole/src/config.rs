//! Connection settings stored in a Pi-hole config entry

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::constants::{CONF_HOST, CONF_LOCATION};

/// Everything needed to reach one Pi-hole
///
/// Serialized with the `CONF_*` keys so it maps one to one onto the
/// entry's data.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// `address:port`
    pub host: String,
    /// Display label, used as the entry title
    pub name: String,
    /// Path segment of the admin interface
    pub location: String,
    #[serde(rename = "ssl")]
    pub use_tls: bool,
    #[serde(rename = "verify_ssl")]
    pub verify_tls: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

// api_key stays out of logs
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("location", &self.location)
            .field("use_tls", &self.use_tls)
            .field("verify_tls", &self.verify_tls)
            .field("api_key", &self.api_key.as_ref().map(|_| "**REDACTED**"))
            .finish()
    }
}

impl ConnectionConfig {
    /// Read the settings back from an entry's data; unknown keys are ignored
    pub fn from_data(data: &HashMap<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ))
    }

    pub fn to_data(&self) -> HashMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// The `(host, location)` pair no two entries may share
    pub fn unique_match(&self) -> HashMap<String, Value> {
        HashMap::from([
            (CONF_HOST.to_string(), Value::from(self.host.clone())),
            (CONF_LOCATION.to_string(), Value::from(self.location.clone())),
        ])
    }
}
