//! Notion ⇄ Google Calendar synchronization.
//!
//! Layers, bottom-up:
//! - [`types`], [`link`], [`mapper`]: record shapes and pure field mapping
//! - [`detector`]: last-write-wins change detection
//! - [`reconciler`]: one bidirectional pass per pair
//! - [`scheduler`]: debounce, backoff and periodic polling
//! - [`manager`]: the surface exposed to hosts

pub mod detector;
pub mod link;
pub mod manager;
pub mod mapper;
pub mod pairs;
pub mod reconciler;
pub mod scheduler;
pub mod stats;
pub mod types;

#[cfg(test)]
mod scheduler_tests;

pub use manager::SyncManager;
pub use pairs::{PairRegistry, PairState, PairStatus};
pub use reconciler::Reconciler;
pub use scheduler::{SchedulerConfig, SchedulerHandle, SchedulerState, SchedulerStatus};
pub use stats::StatsBook;
pub use types::{SyncJob, SyncPair, SyncReport, SyncStats};
