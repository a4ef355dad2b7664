//! Config Entries Manager
//!
//! Manages the lifecycle of configuration entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};
use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 5;

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(#[from] SetupFailure),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Why an integration could not set up an entry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupFailure {
    /// Credentials stopped working; the entry needs reauthentication
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Device unreachable for now; setup may be retried later
    #[error("not ready: {0}")]
    NotReady(String),

    #[error("{0}")]
    Error(String),
}

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Integration hooks called when an entry of its domain is set up or unloaded
#[async_trait]
pub trait SetupHandler: Send + Sync {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupFailure>;

    async fn unload_entry(&self, entry: &ConfigEntry) -> bool;
}

/// Config Entries Manager
///
/// Owns every persisted entry and its runtime lifecycle state:
/// - Loading/saving from storage
/// - Entry creation, update and removal
/// - Setup, unload and reload through registered [`SetupHandler`]s
pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup/unload
    setup_lock: Mutex<()>,

    setup_handlers: DashMap<String, Arc<dyn SetupHandler>>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            setup_handlers: DashMap::new(),
        }
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<ConfigEntriesData>().await? {
            info!(
                "Loading {} config entries from storage (v{}.{})",
                storage_file.data.entries.len(),
                storage_file.version,
                storage_file.minor_version
            );

            for entry in storage_file.data.entries {
                self.index_entry(&entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = ConfigEntriesData {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} config entries to storage", data.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.entries.insert(entry_id.clone(), entry.clone());

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id);
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get entry by unique_id
    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Whether a non-ignored entry of `domain` already has all of `matcher` in its data
    pub fn entries_match(&self, domain: &str, matcher: &HashMap<String, serde_json::Value>) -> bool {
        self.get_by_domain(domain)
            .iter()
            .filter(|entry| entry.source != ConfigEntrySource::Ignore)
            .any(|entry| entry.data_matches(matcher))
    }

    /// Add a new config entry
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );

        Ok(entry)
    }

    /// Update an existing entry
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);

        let mut updated = entry;
        if let Some(data) = update.data {
            updated.data = data;
        }
        if let Some(unique_id) = update.unique_id {
            updated.unique_id = unique_id;
        }
        updated.modified_at = Utc::now();

        self.index_entry(&updated);
        self.save().await?;

        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Remove an entry, unloading it first if it is loaded
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_loaded() {
            self.unload(entry_id).await?;
        }

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );

        Ok(entry)
    }

    /// Set entry state
    pub fn set_state(&self, entry_id: &str, state: ConfigEntryState, reason: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            entry.state = state;
            entry.reason = reason;
            debug!("Entry {} state changed to {:?}", entry_id, state);
        }
    }

    /// Register the setup handler for a domain
    pub fn register_setup_handler(&self, domain: &str, handler: Arc<dyn SetupHandler>) {
        self.setup_handlers.insert(domain.to_string(), handler);
        debug!("Registered setup handler for domain: {}", domain);
    }

    fn handler_for(&self, domain: &str) -> Option<Arc<dyn SetupHandler>> {
        self.setup_handlers.get(domain).map(|h| h.value().clone())
    }

    /// Setup an entry (call integration's setup)
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.set_state(entry_id, ConfigEntryState::SetupInProgress, None);

        let Some(handler) = self.handler_for(&entry.domain) else {
            self.set_state(entry_id, ConfigEntryState::Loaded, None);
            debug!(
                "No setup handler for domain {}, marking as loaded",
                entry.domain
            );
            return Ok(());
        };

        match handler.setup_entry(&entry).await {
            Ok(()) => {
                self.set_state(entry_id, ConfigEntryState::Loaded, None);
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(failure) => {
                warn!("Setup failed for entry {}: {}", entry_id, failure);
                let state = match failure {
                    SetupFailure::NotReady(_) => ConfigEntryState::SetupRetry,
                    SetupFailure::AuthFailed(_) | SetupFailure::Error(_) => {
                        ConfigEntryState::SetupError
                    }
                };
                self.set_state(entry_id, state, Some(failure.to_string()));
                Err(failure.into())
            }
        }
    }

    /// Unload an entry
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }

        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(());
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None);

        let unloaded = match self.handler_for(&entry.domain) {
            Some(handler) => handler.unload_entry(&entry).await,
            None => true,
        };

        if !unloaded {
            self.set_state(entry_id, ConfigEntryState::FailedUnload, None);
            return Err(ConfigEntriesError::CannotUnload(ConfigEntryState::FailedUnload));
        }

        self.set_state(entry_id, ConfigEntryState::NotLoaded, None);
        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(())
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Setup all entries
    pub async fn setup_all(&self) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::new();
        for entry_id in self.entry_ids() {
            results.push(self.setup(&entry_id).await);
        }
        results
    }
}
