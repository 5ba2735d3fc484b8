mod config;
pub mod stats_store;

pub use config::{Config, GoogleConfig, LogConfig, NotionConfig, SyncConfig};
pub use stats_store::{MemoryStatsStore, SqliteStatsStore, StatsStore, StatsStoreExt};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `SYNK_DATA_DIR` wins when set. Otherwise `~/.config/synk[-dev]/`,
/// with `SYNK_ENV=dev` selecting the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var("SYNK_DATA_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("SYNK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("synk-dev")
            } else {
                base_dir.join("synk")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
