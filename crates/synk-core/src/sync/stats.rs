//! In-memory [`SyncStats`] snapshot backed by a [`StatsStore`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::storage::{StatsStore, StatsStoreExt};
use crate::sync::types::SyncStats;

/// Store key holding the serialized [`SyncStats`].
pub const STATS_KEY: &str = "sync_stats";

/// Reads are served from memory; every record is written through.
pub struct StatsBook {
    store: Arc<dyn StatsStore>,
    current: Mutex<SyncStats>,
}

impl StatsBook {
    /// Load persisted stats, starting from zero when none exist.
    pub fn load(store: Arc<dyn StatsStore>) -> Result<Self, StoreError> {
        let current = store.load_json::<SyncStats>(STATS_KEY)?.unwrap_or_default();
        Ok(Self {
            store,
            current: Mutex::new(current),
        })
    }

    pub fn snapshot(&self) -> SyncStats {
        self.lock().clone()
    }

    pub fn record_success(&self, pair_key: &str, at: DateTime<Utc>) {
        self.update(|stats| stats.record_success(pair_key, at));
    }

    pub fn record_failure(&self, pair_key: &str, message: impl Into<String>) {
        let message = message.into();
        self.update(|stats| stats.record_failure(pair_key, message));
    }

    fn update(&self, apply: impl FnOnce(&mut SyncStats)) {
        let snapshot = {
            let mut stats = self.lock();
            apply(&mut stats);
            stats.clone()
        };
        if let Err(e) = self.store.save_json(STATS_KEY, &snapshot) {
            tracing::warn!(error = %e, "Failed to persist sync stats");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncStats> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
