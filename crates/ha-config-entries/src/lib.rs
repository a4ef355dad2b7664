//! Config Entries
//!
//! This crate provides the configuration entry system. Config entries
//! represent individual integration instances and manage their lifecycle
//! (setup, unload, reload).
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`SetupHandler`] - Integration hooks for entry setup/unload
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.

pub mod entry;
pub mod manager;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, SetupFailure,
    SetupHandler, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
