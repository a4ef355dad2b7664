//! Tests for Pi-hole entry setup and sensors

mod common;

use common::*;
use serde_json::{json, Value};
use std::time::Duration;

use ha_config_entries::{ConfigEntriesError, ConfigEntryState, SetupFailure};
use ha_pi_hole::constants::MIN_TIME_BETWEEN_UPDATES;
use ha_pi_hole::{async_setup_entry, PiHoleApi, SENSOR_TYPES};

fn entry_data(api_key: &str) -> Value {
    json!({
        "host": "192.168.1.10:80",
        "name": "Pi-Hole",
        "location": "admin",
        "ssl": false,
        "verify_ssl": true,
        "api_key": api_key
    })
}

#[tokio::test]
async fn test_setup_drops_statistics_only() {
    let harness = TestHarness::new(MockHole::new());
    let mut data = entry_data("");
    data["statistics_only"] = json!(true);
    let entry = harness.add_entry("Pi-Hole", data).await;

    harness.entries.setup(&entry.entry_id).await.unwrap();

    let entry = harness.entries.get(&entry.entry_id).unwrap();
    assert!(!entry.data.contains_key("statistics_only"));
    assert_eq!(entry.data.len(), 6);
    assert_eq!(entry.state, ConfigEntryState::Loaded);
}

#[tokio::test]
async fn test_setup_passes_connection_settings() {
    let harness = TestHarness::new(MockHole::with_password("secret"));
    let mut data = entry_data("secret");
    data["ssl"] = json!(true);
    data["verify_ssl"] = json!(false);
    let entry = harness.add_entry("Pi-Hole", data).await;

    let runtime = async_setup_entry(
        &harness.entries,
        &entry,
        &SharedFactory(harness.hole.clone()),
        MIN_TIME_BETWEEN_UPDATES,
    )
    .await
    .unwrap();

    let params = &harness.hole.created()[0];
    assert_eq!(params.host, "192.168.1.10:80");
    assert_eq!(params.location, "admin");
    assert!(params.use_tls);
    assert!(!params.verify_tls);
    assert_eq!(params.password.as_deref(), Some("secret"));
    assert_eq!(runtime.api.base_url(), "http://192.168.1.10:80/admin");
    assert_eq!(runtime.coordinator.data().await, Some(sample_summary()));
}

#[tokio::test]
async fn test_setup_auth_failure() {
    let harness = TestHarness::new(MockHole::with_password("secret"));
    let entry = harness.add_entry("Pi-Hole", entry_data("stale")).await;

    let result = harness.entries.setup(&entry.entry_id).await;
    assert!(matches!(
        result,
        Err(ConfigEntriesError::SetupFailed(SetupFailure::AuthFailed(_)))
    ));

    let entry = harness.entries.get(&entry.entry_id).unwrap();
    assert_eq!(entry.state, ConfigEntryState::SetupError);
    assert!(entry.reason.unwrap().starts_with("authentication failed"));
    assert!(harness.integration.runtime(&entry.entry_id).is_none());

    let flows = reauth_flows(&harness.flows, &entry.entry_id);
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].1, json!("reauth_confirm"));

    // Failing again does not open a second reauth flow
    assert!(harness.entries.reload(&entry.entry_id).await.is_err());
    assert_eq!(reauth_flows(&harness.flows, &entry.entry_id), flows);
}

#[tokio::test]
async fn test_offline_setup_does_not_start_reauth() {
    let harness = TestHarness::new(MockHole::with_password("secret"));
    harness.hole.set_online(false);
    let entry = harness.add_entry("Pi-Hole", entry_data("secret")).await;

    assert!(harness.entries.setup(&entry.entry_id).await.is_err());
    assert!(harness.flows.async_progress().is_empty());
}

#[tokio::test]
async fn test_polling_starts_reauth_when_key_is_revoked() {
    let harness = TestHarness::polling(MockHole::with_password("secret"), Duration::from_millis(20));
    let entry = harness.add_entry("Pi-Hole", entry_data("secret")).await;
    harness.entries.setup(&entry.entry_id).await.unwrap();
    assert!(harness.flows.async_progress().is_empty());

    harness.hole.set_password(Some("rotated"));

    let mut flows = Vec::new();
    for _ in 0..100 {
        flows = reauth_flows(&harness.flows, &entry.entry_id);
        if !flows.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].1, json!("reauth_confirm"));

    // Polling stopped; the entry stays loaded until reauthenticated
    let requests = harness.hole.requests();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.hole.requests(), requests);
    assert_eq!(
        harness.entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::Loaded
    );

    harness.entries.unload(&entry.entry_id).await.unwrap();
}

#[tokio::test]
async fn test_setup_offline_is_retried() {
    let harness = TestHarness::new(MockHole::new());
    harness.hole.set_online(false);
    let entry = harness.add_entry("Pi-Hole", entry_data("")).await;

    let result = harness.entries.setup(&entry.entry_id).await;
    assert!(matches!(
        result,
        Err(ConfigEntriesError::SetupFailed(SetupFailure::NotReady(_)))
    ));
    assert_eq!(
        harness.entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::SetupRetry
    );

    harness.hole.set_online(true);
    harness.entries.reload(&entry.entry_id).await.unwrap();
    assert_eq!(
        harness.entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::Loaded
    );
}

#[tokio::test]
async fn test_setup_rejects_incomplete_data() {
    let harness = TestHarness::new(MockHole::new());
    let entry = harness
        .add_entry("Pi-Hole", json!({"host": "192.168.1.10:80"}))
        .await;

    let result = harness.entries.setup(&entry.entry_id).await;
    assert!(matches!(
        result,
        Err(ConfigEntriesError::SetupFailed(SetupFailure::Error(_)))
    ));
    assert_eq!(harness.hole.requests(), 0);
}

#[tokio::test]
async fn test_sensors() {
    let harness = TestHarness::new(MockHole::new());
    let mut summary = sample_summary();
    summary.queries.percent_blocked = 33.33333;
    harness.hole.set_summary(summary);

    let entry = harness.add_entry("Pi-Hole", entry_data("")).await;
    harness.entries.setup(&entry.entry_id).await.unwrap();

    let sensors = harness.integration.sensors(&entry.entry_id);
    assert_eq!(sensors.len(), SENSOR_TYPES.len());

    let sensor = |key: &str| {
        sensors
            .iter()
            .find(|s| s.description.key == key)
            .unwrap()
    };

    let percentage = sensor("ads_percentage_today");
    assert_eq!(
        percentage.unique_id(),
        format!("{}/ads_percentage_today", entry.entry_id)
    );
    assert_eq!(percentage.device_name(), "Pi-Hole");
    assert_eq!(percentage.description.native_unit_of_measurement, Some("%"));
    assert_eq!(percentage.native_value().await, json!(33.33));

    assert_eq!(sensor("ads_blocked_today").native_value().await, json!(300));
    assert_eq!(sensor("dns_queries_today").native_value().await, json!(1200));
    assert_eq!(sensor("clients_ever_seen").native_value().await, json!(9));
    assert_eq!(sensor("unique_clients").native_value().await, json!(4));
    assert_eq!(
        sensor("domains_being_blocked").native_value().await,
        json!(120000)
    );
}

#[tokio::test]
async fn test_unload_drops_runtime() {
    let harness = TestHarness::new(MockHole::new());
    let entry = harness.add_entry("Pi-Hole", entry_data("")).await;
    harness.entries.setup(&entry.entry_id).await.unwrap();
    assert_eq!(harness.integration.loaded_entry_ids(), vec![entry.entry_id.clone()]);

    harness.entries.unload(&entry.entry_id).await.unwrap();

    assert!(harness.integration.runtime(&entry.entry_id).is_none());
    assert!(harness.integration.sensors(&entry.entry_id).is_empty());
    assert_eq!(
        harness.entries.get(&entry.entry_id).unwrap().state,
        ConfigEntryState::NotLoaded
    );
}

#[tokio::test]
async fn test_remove_unloads_entry() {
    let harness = TestHarness::new(MockHole::new());
    let entry = harness.add_entry("Pi-Hole", entry_data("")).await;
    harness.entries.setup(&entry.entry_id).await.unwrap();

    harness.entries.remove(&entry.entry_id).await.unwrap();

    assert!(harness.entries.is_empty());
    assert!(harness.integration.loaded_entry_ids().is_empty());
}
