//! Registry of configured pairs and their run state.
//!
//! The pair list is persisted under [`PAIRS_KEY`]; run state (paused after
//! expired credentials, blocked by a schema problem) lives only in memory
//! and is cleared by [`PairRegistry::resume`].

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::StoreError;
use crate::storage::{StatsStore, StatsStoreExt};
use crate::sync::types::SyncPair;

/// Store key holding the list of configured pairs.
pub const PAIRS_KEY: &str = "sync_pairs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    Active,
    /// Credentials expired; waits for re-authentication.
    Paused,
    /// The database cannot be synced as configured.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairStatus {
    pub key: String,
    pub pair: SyncPair,
    pub state: PairState,
    pub reason: Option<String>,
}

pub struct PairRegistry {
    store: Arc<dyn StatsStore>,
    pairs: Mutex<IndexMap<String, PairStatus>>,
}

impl PairRegistry {
    pub fn load(store: Arc<dyn StatsStore>) -> Result<Self, StoreError> {
        let saved: Vec<SyncPair> = store.load_json(PAIRS_KEY)?.unwrap_or_default();
        let pairs = saved
            .into_iter()
            .map(|pair| (pair.key(), active(pair)))
            .collect();
        Ok(Self {
            store,
            pairs: Mutex::new(pairs),
        })
    }

    /// Add a pair. Returns `false` if it was already registered.
    pub fn add(&self, pair: SyncPair) -> Result<bool, StoreError> {
        let mut pairs = self.lock();
        let key = pair.key();
        if pairs.contains_key(&key) {
            return Ok(false);
        }
        pairs.insert(key, active(pair));
        self.persist(&pairs)?;
        Ok(true)
    }

    /// Remove a pair. Returns `false` if it was not registered.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut pairs = self.lock();
        if pairs.shift_remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&pairs)?;
        Ok(true)
    }

    pub fn list(&self) -> Vec<PairStatus> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<PairStatus> {
        self.lock().get(key).cloned()
    }

    /// Pairs eligible for syncing, in registration order.
    pub fn active(&self) -> Vec<SyncPair> {
        self.lock()
            .values()
            .filter(|status| status.state == PairState::Active)
            .map(|status| status.pair.clone())
            .collect()
    }

    pub fn set_state(&self, key: &str, state: PairState, reason: Option<String>) {
        if let Some(status) = self.lock().get_mut(key) {
            status.state = state;
            status.reason = reason;
        }
    }

    /// Return a paused or blocked pair to active. `false` if unknown.
    pub fn resume(&self, key: &str) -> bool {
        match self.lock().get_mut(key) {
            Some(status) => {
                status.state = PairState::Active;
                status.reason = None;
                true
            }
            None => false,
        }
    }

    fn persist(&self, pairs: &IndexMap<String, PairStatus>) -> Result<(), StoreError> {
        let list: Vec<&SyncPair> = pairs.values().map(|status| &status.pair).collect();
        self.store.save_json(PAIRS_KEY, &list)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, PairStatus>> {
        self.pairs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn active(pair: SyncPair) -> PairStatus {
    PairStatus {
        key: pair.key(),
        pair,
        state: PairState::Active,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStatsStore;

    #[test]
    fn pairs_persist_in_order() {
        let store = Arc::new(MemoryStatsStore::new());
        let registry = PairRegistry::load(store.clone()).unwrap();
        assert!(registry.add(SyncPair::new("db2", "cal")).unwrap());
        assert!(registry.add(SyncPair::new("db1", "cal")).unwrap());
        assert!(!registry.add(SyncPair::new("db1", "cal")).unwrap());

        let reloaded = PairRegistry::load(store).unwrap();
        let keys: Vec<_> = reloaded.list().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, ["db2:cal", "db1:cal"]);
    }

    #[test]
    fn blocked_pairs_are_not_active_until_resumed() {
        let registry = PairRegistry::load(Arc::new(MemoryStatsStore::new())).unwrap();
        registry.add(SyncPair::new("db1", "cal")).unwrap();
        registry.set_state("db1:cal", PairState::Blocked, Some("no date property".into()));
        assert!(registry.active().is_empty());
        assert_eq!(registry.get("db1:cal").unwrap().state, PairState::Blocked);

        assert!(registry.resume("db1:cal"));
        assert_eq!(registry.active(), vec![SyncPair::new("db1", "cal")]);
        assert!(!registry.resume("missing:cal"));
    }

    #[test]
    fn remove_unknown_pair() {
        let registry = PairRegistry::load(Arc::new(MemoryStatsStore::new())).unwrap();
        assert!(!registry.remove("db1:cal").unwrap());
    }
}
