//! Long-running mode: the scheduler keeps every pair in sync until Ctrl-C.

use synk_core::sync::types::FULL_POLL;
use synk_core::{Config, SyncManager};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let manager = SyncManager::start(&config)?;
        manager.on_local_change(FULL_POLL);
        println!(
            "Syncing {} pair(s) every {}s. Press Ctrl-C to stop.",
            manager.pairs().len(),
            config.sync.poll_interval_secs
        );

        tokio::signal::ctrl_c().await?;
        println!("Stopping...");
        manager.shutdown().await;

        let stats = manager.get_stats();
        println!(
            "{} sync(s): {} succeeded, {} failed",
            stats.total_syncs, stats.successful_syncs, stats.failed_syncs
        );
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
