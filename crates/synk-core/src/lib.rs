//! # Synk Core Library
//!
//! Keeps Notion databases and Google Calendars in step. Each configured
//! pair is reconciled in both directions with last-write-wins semantics;
//! local changes are debounced and remote drift is picked up by polling.
//!
//! ## Architecture
//!
//! - **Sync**: field mapping, change detection, the per-pair reconciler and
//!   the scheduler that drives it
//! - **Integrations**: Notion and Google Calendar REST clients and the
//!   keyring-backed identity provider
//! - **Storage**: TOML configuration and the SQLite key-value store holding
//!   stats and the pair list
//!
//! ## Key Components
//!
//! - [`SyncManager`]: host-facing entry point
//! - [`Reconciler`]: one bidirectional pass for a [`SyncPair`]
//! - [`Config`]: application configuration management

pub mod error;
pub mod integrations;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ConfigError, MappingError, StoreError, SyncError};
pub use storage::{data_dir, Config, SqliteStatsStore, StatsStore};
pub use sync::{Reconciler, SyncJob, SyncManager, SyncPair, SyncReport, SyncStats};
