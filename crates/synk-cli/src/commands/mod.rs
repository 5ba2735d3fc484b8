pub mod config;
pub mod pair;
pub mod run;
pub mod schema;
pub mod stats;
pub mod sync;

use std::sync::Arc;

use synk_core::{SqliteStatsStore, StatsStore};

/// Open the store in the data directory.
pub fn open_store() -> Result<Arc<dyn StatsStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStatsStore::open()?))
}
