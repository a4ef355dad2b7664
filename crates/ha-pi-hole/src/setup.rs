//! Entry setup and lifecycle for the Pi-hole integration

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntryUpdate, SetupFailure, SetupHandler};
use ha_data_entry_flow::{FlowError, FlowManager};

use crate::api::{ApiFactory, HoleParams, PiHoleApi};
use crate::config::ConnectionConfig;
use crate::config_flow::async_start_reauth;
use crate::constants::{CONF_STATISTICS_ONLY, DOMAIN, MIN_TIME_BETWEEN_UPDATES};
use crate::coordinator::Coordinator;
use crate::sensor::{self, PiHoleSensor};

/// Runtime data of a loaded entry
#[derive(Clone)]
pub struct PiHoleRuntime {
    pub api: Arc<dyn PiHoleApi>,
    pub coordinator: Arc<Coordinator>,
}

/// Set up Pi-hole entry
pub async fn async_setup_entry(
    entries: &ConfigEntries,
    entry: &ConfigEntry,
    factory: &dyn ApiFactory,
    update_interval: Duration,
) -> Result<PiHoleRuntime, SetupFailure> {
    let mut entry = entry.clone();

    if entry.data.contains_key(CONF_STATISTICS_ONLY) {
        let mut data = entry.data.clone();
        data.remove(CONF_STATISTICS_ONLY);
        entry = entries
            .update(&entry.entry_id, ConfigEntryUpdate::new().data(data))
            .await
            .map_err(|e| SetupFailure::Error(e.to_string()))?;
    }

    let config =
        ConnectionConfig::from_data(&entry.data).map_err(|e| SetupFailure::Error(e.to_string()))?;
    debug!("Setting up {} integration with host {}", DOMAIN, config.host);

    let api = factory
        .create(HoleParams::from(&config))
        .map_err(|e| SetupFailure::NotReady(e.to_string()))?;

    let coordinator = Arc::new(Coordinator::new(config.name, api.clone(), update_interval));
    coordinator.first_refresh().await?;

    Ok(PiHoleRuntime { api, coordinator })
}

struct LoadedEntry {
    runtime: PiHoleRuntime,
    title: String,
    poller: Option<JoinHandle<()>>,
}

/// Start a reauth flow for `entry_id` unless one is already running
async fn start_reauth(flows: Option<Weak<FlowManager>>, entry_id: &str) {
    let Some(flows) = flows.as_ref().and_then(Weak::upgrade) else {
        warn!("No config flows available to reauthenticate {}", entry_id);
        return;
    };

    match async_start_reauth(&flows, entry_id).await {
        Ok(response) => info!(flow_id = %response.flow_id, "Started reauth for entry {}", entry_id),
        Err(FlowError::AlreadyInProgress(flow_id)) => {
            debug!(flow_id = %flow_id, "Reauth for entry {} already in progress", entry_id)
        }
        Err(err) => warn!("Failed to start reauth for entry {}: {}", entry_id, err),
    }
}

/// The Pi-hole integration
///
/// Sets up entries of [`DOMAIN`] and keeps their runtime data until
/// they are unloaded. Rejected credentials start a reauth flow once the
/// integration is attached to a [`FlowManager`].
pub struct PiHoleIntegration {
    entries: Weak<ConfigEntries>,
    flows: OnceLock<Weak<FlowManager>>,
    factory: Arc<dyn ApiFactory>,
    poll: bool,
    update_interval: Duration,
    loaded: DashMap<String, LoadedEntry>,
}

impl PiHoleIntegration {
    pub fn new(entries: &Arc<ConfigEntries>, factory: Arc<dyn ApiFactory>) -> Self {
        Self {
            entries: Arc::downgrade(entries),
            flows: OnceLock::new(),
            factory,
            poll: true,
            update_interval: MIN_TIME_BETWEEN_UPDATES,
            loaded: DashMap::new(),
        }
    }

    /// Do not refresh loaded entries in the background
    pub fn without_polling(mut self) -> Self {
        self.poll = false;
        self
    }

    pub fn with_update_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    /// Flows used to reauthenticate entries; the first attachment wins
    pub(crate) fn attach_flows(&self, flows: &Arc<FlowManager>) {
        if self.flows.set(Arc::downgrade(flows)).is_err() {
            warn!("Pi-hole integration is already attached to config flows");
        }
    }

    pub fn runtime(&self, entry_id: &str) -> Option<PiHoleRuntime> {
        self.loaded.get(entry_id).map(|l| l.runtime.clone())
    }

    pub fn loaded_entry_ids(&self) -> Vec<String> {
        self.loaded.iter().map(|l| l.key().clone()).collect()
    }

    /// Sensors of a loaded entry
    pub fn sensors(&self, entry_id: &str) -> Vec<PiHoleSensor> {
        self.loaded
            .get(entry_id)
            .map(|l| sensor::async_setup_entry(&l.title, entry_id, &l.runtime))
            .unwrap_or_default()
    }
}

#[async_trait]
impl SetupHandler for PiHoleIntegration {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupFailure> {
        let entries = self
            .entries
            .upgrade()
            .ok_or_else(|| SetupFailure::Error("config entries are gone".to_string()))?;

        let runtime =
            match async_setup_entry(&entries, entry, self.factory.as_ref(), self.update_interval)
                .await
            {
                Ok(runtime) => runtime,
                Err(failure @ SetupFailure::AuthFailed(_)) => {
                    start_reauth(self.flows.get().cloned(), &entry.entry_id).await;
                    return Err(failure);
                }
                Err(failure) => return Err(failure),
            };

        let poller = self.poll.then(|| {
            let flows = self.flows.get().cloned();
            let entry_id = entry.entry_id.clone();
            runtime
                .coordinator
                .spawn_polling(async move { start_reauth(flows, &entry_id).await })
        });

        let previous = self.loaded.insert(
            entry.entry_id.clone(),
            LoadedEntry {
                runtime,
                title: entry.title.clone(),
                poller,
            },
        );
        if let Some(poller) = previous.and_then(|p| p.poller) {
            warn!("Entry {} was set up twice", entry.entry_id);
            poller.abort();
        }
        Ok(())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> bool {
        if let Some((_, loaded)) = self.loaded.remove(&entry.entry_id) {
            if let Some(poller) = loaded.poller {
                poller.abort();
            }
            debug!("Unloaded Pi-hole entry {}", entry.entry_id);
        }
        true
    }
}
