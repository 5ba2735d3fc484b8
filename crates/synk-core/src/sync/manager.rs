//! Entry point for hosts: owns the pair registry, the reconciler and the
//! scheduler task.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, StoreError, SyncError};
use crate::storage::{Config, SqliteStatsStore, StatsStore};
use crate::sync::pairs::{PairRegistry, PairState, PairStatus};
use crate::sync::reconciler::Reconciler;
use crate::sync::scheduler::{JobRunner, SchedulerConfig, SchedulerHandle, SchedulerStatus};
use crate::sync::stats::StatsBook;
use crate::sync::types::{SyncJob, SyncPair, SyncStats};

/// Runs scheduler jobs against the registered pairs.
struct Engine {
    reconciler: Reconciler,
    pairs: PairRegistry,
}

impl Engine {
    /// Sync one pair, converting errors that need a human into pair state.
    /// Only errors worth retrying are returned.
    async fn run_pair(&self, pair: &SyncPair) -> Result<()> {
        let key = pair.key();
        match self.reconciler.sync_pair(pair).await {
            Ok(_) => Ok(()),
            Err(e @ (SyncError::Schema { .. } | SyncError::InvalidWindow { .. })) => {
                tracing::warn!(pair = %key, error = %e, "Pair blocked until reconfigured");
                self.pairs
                    .set_state(&key, PairState::Blocked, Some(e.to_string()));
                Ok(())
            }
            Err(e @ SyncError::AuthenticationExpired { .. }) => {
                tracing::warn!(pair = %key, error = %e, "Pair paused until re-authentication");
                self.pairs
                    .set_state(&key, PairState::Paused, Some(e.to_string()));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl JobRunner for Engine {
    async fn run(&self, job: &SyncJob) -> Result<()> {
        match job {
            SyncJob::Pair(key) => match self.pairs.get(key) {
                Some(status) if status.state == PairState::Active => {
                    self.run_pair(&status.pair).await
                }
                Some(status) => {
                    tracing::debug!(pair = %key, state = ?status.state, "Skipping inactive pair");
                    Ok(())
                }
                None => {
                    tracing::debug!(pair = %key, "Ignoring change for unknown pair");
                    Ok(())
                }
            },
            SyncJob::FullPoll => {
                let mut first_error = None;
                for pair in self.pairs.active() {
                    if let Err(e) = self.run_pair(&pair).await {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }
}

/// The sync engine as seen by a host process.
///
/// Must be created inside a tokio runtime; the scheduler task starts
/// immediately.
pub struct SyncManager {
    engine: Arc<Engine>,
    scheduler: SchedulerHandle,
}

impl SyncManager {
    pub fn new(
        reconciler: Reconciler,
        store: Arc<dyn StatsStore>,
        config: SchedulerConfig,
    ) -> Result<Self, StoreError> {
        let engine = Arc::new(Engine {
            reconciler,
            pairs: PairRegistry::load(store)?,
        });
        let scheduler = SchedulerHandle::spawn(config, engine.clone());
        Ok(Self { engine, scheduler })
    }

    /// Start against the real services, persisting to the data directory.
    pub fn start(config: &Config) -> Result<Self> {
        let store: Arc<dyn StatsStore> = Arc::new(SqliteStatsStore::open()?);
        let stats = Arc::new(StatsBook::load(store.clone())?);
        let reconciler = Reconciler::from_config(config, stats);
        let manager = Self::new(reconciler, store, SchedulerConfig::from(&config.sync))?;
        tracing::info!(pairs = manager.pairs().len(), "Sync manager started");
        Ok(manager)
    }

    /// Request a sync of `pair_key` (or `"full-poll"`). Fire and forget.
    pub fn on_local_change(&self, pair_key: &str) {
        self.scheduler.enqueue(SyncJob::from_key(pair_key));
    }

    /// Register a pair and schedule its first sync.
    pub fn add_sync_pair(
        &self,
        notion_database_id: &str,
        google_calendar_id: &str,
    ) -> Result<SyncPair, StoreError> {
        let pair = SyncPair::new(notion_database_id, google_calendar_id);
        if self.engine.pairs.add(pair.clone())? {
            tracing::info!(pair = %pair.key(), "Sync pair added");
        }
        self.scheduler.enqueue(SyncJob::Pair(pair.key()));
        Ok(pair)
    }

    /// Unregister a pair. Returns `false` if it was not registered.
    pub fn remove_sync_pair(
        &self,
        notion_database_id: &str,
        google_calendar_id: &str,
    ) -> Result<bool, StoreError> {
        let key = SyncPair::new(notion_database_id, google_calendar_id).key();
        let removed = self.engine.pairs.remove(&key)?;
        if removed {
            tracing::info!(pair = %key, "Sync pair removed");
        }
        Ok(removed)
    }

    pub fn pairs(&self) -> Vec<PairStatus> {
        self.engine.pairs.list()
    }

    /// Reactivate a paused or blocked pair and sync it.
    pub fn resume_pair(&self, pair_key: &str) -> bool {
        let resumed = self.engine.pairs.resume(pair_key);
        if resumed {
            self.scheduler.enqueue(SyncJob::Pair(pair_key.to_string()));
        }
        resumed
    }

    pub fn get_stats(&self) -> SyncStats {
        self.engine.reconciler.stats().snapshot()
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Cancel timers. A flush in progress completes.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Stop and wait for any in-flight flush to finish.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
