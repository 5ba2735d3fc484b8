use synk_core::sync::StatsBook;

use super::open_store;

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stats = StatsBook::load(open_store()?)?.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Total syncs:      {}", stats.total_syncs);
    println!("Successful syncs: {}", stats.successful_syncs);
    println!("Failed syncs:     {}", stats.failed_syncs);
    for (pair, at) in &stats.last_sync_at {
        println!("{pair}: last synced {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    for (pair, error) in &stats.last_error {
        println!("{pair}: last error: {error}");
    }
    Ok(())
}
