//! Home Assistant Rust Server
//!
//! Loads the stored config entries, registers the Pi-hole integration and
//! keeps every entry polling until interrupted. Entries whose credentials
//! are rejected get a reauth flow.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ha_config_entries::{ConfigEntries, Storage};
use ha_data_entry_flow::FlowManager;
use ha_pi_hole::HoleV6Factory;

/// Environment variable naming the configuration directory
const CONFIG_DIR_ENV: &str = "HASS_CONFIG_DIR";

fn config_dir() -> PathBuf {
    std::env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = config_dir();
    info!("Starting Home Assistant (Rust) in {}", config_dir.display());

    let storage = Arc::new(Storage::new(&config_dir));
    let entries = Arc::new(ConfigEntries::new(storage));
    entries
        .load()
        .await
        .context("failed to load config entries")?;

    let flows = Arc::new(FlowManager::new(entries.clone()));
    let pi_hole = ha_pi_hole::register(&flows, Arc::new(HoleV6Factory::new()));

    for entry_id in entries.entry_ids() {
        if let Err(err) = entries.setup(&entry_id).await {
            warn!("Entry {} is not running: {}", entry_id, err);
        }
    }
    info!(
        "Home Assistant is running with {} Pi-hole entries loaded",
        pi_hole.loaded_entry_ids().len()
    );
    for flow in flows.async_progress() {
        info!("Config flow waiting for input: {}", flow);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for entry_id in pi_hole.loaded_entry_ids() {
        if let Err(err) = entries.unload(&entry_id).await {
            warn!("Failed to unload {}: {}", entry_id, err);
        }
    }

    Ok(())
}
