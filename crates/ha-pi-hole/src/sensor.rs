//! Support for getting statistical data from a Pi-hole system

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use crate::constants::PERCENTAGE;
use crate::coordinator::Coordinator;
use crate::setup::PiHoleRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorEntityDescription {
    pub key: &'static str,
    pub translation_key: &'static str,
    pub native_unit_of_measurement: Option<&'static str>,
}

const fn description(key: &'static str) -> SensorEntityDescription {
    SensorEntityDescription {
        key,
        translation_key: key,
        native_unit_of_measurement: None,
    }
}

pub const SENSOR_TYPES: [SensorEntityDescription; 9] = [
    description("ads_blocked_today"),
    SensorEntityDescription {
        native_unit_of_measurement: Some(PERCENTAGE),
        ..description("ads_percentage_today")
    },
    description("clients_ever_seen"),
    description("dns_queries_today"),
    description("domains_being_blocked"),
    description("queries_cached"),
    description("queries_forwarded"),
    description("unique_clients"),
    description("unique_domains"),
];

/// Representation of a Pi-hole sensor
pub struct PiHoleSensor {
    coordinator: Arc<Coordinator>,
    name: String,
    server_unique_id: String,
    pub description: SensorEntityDescription,
}

impl PiHoleSensor {
    pub fn unique_id(&self) -> String {
        format!("{}/{}", self.server_unique_id, self.description.key)
    }

    /// Device name the sensor belongs to
    pub fn device_name(&self) -> &str {
        &self.name
    }

    /// Current value, rounded to two decimals; `"unknown"` when the
    /// Pi-hole does not report this statistic
    pub async fn native_value(&self) -> Value {
        let key = self.description.key;
        debug!("Setting native_value for '{}'", key);

        let Some(summary) = self.coordinator.data().await else {
            return Value::from("unknown");
        };

        match summary.get(key) {
            Some(value) => {
                debug!("Value for '{}' is '{}'", key, value);
                round(value)
            }
            None => {
                error!("Pi-hole API does not support '{}' attribute", key);
                Value::from("unknown")
            }
        }
    }
}

fn round(value: Value) -> Value {
    match value.as_f64() {
        Some(f) if value.is_f64() => Value::from((f * 100.0).round() / 100.0),
        _ => value,
    }
}

/// Set up the Pi-hole sensors of an entry
pub fn async_setup_entry(name: &str, entry_id: &str, runtime: &PiHoleRuntime) -> Vec<PiHoleSensor> {
    SENSOR_TYPES
        .iter()
        .map(|description| PiHoleSensor {
            coordinator: runtime.coordinator.clone(),
            name: name.to_string(),
            server_unique_id: entry_id.to_string(),
            description: *description,
        })
        .collect()
}
