//! One-shot reconciliation of configured pairs.

use std::sync::Arc;

use synk_core::sync::{PairRegistry, StatsBook};
use synk_core::{Config, Reconciler, SyncPair, SyncReport};

use super::open_store;

pub fn run(pair: Option<String>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = open_store()?;
    let registry = PairRegistry::load(store.clone())?;

    let pairs: Vec<SyncPair> = match pair {
        Some(key) => {
            let status = registry
                .get(&key)
                .ok_or_else(|| format!("unknown pair: {key}"))?;
            vec![status.pair]
        }
        None => registry.active(),
    };
    if pairs.is_empty() {
        println!("No sync pairs configured.");
        return Ok(());
    }

    tracing::debug!(pairs = pairs.len(), "Running one-shot sync");
    let reconciler = Reconciler::from_config(&config, Arc::new(StatsBook::load(store)?));
    let rt = tokio::runtime::Runtime::new()?;

    let mut failed = 0;
    for pair in &pairs {
        match rt.block_on(reconciler.sync_pair(pair)) {
            Ok(report) => print_report(&report, json)?,
            Err(e) => {
                eprintln!("{}: {e}", pair.key());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} pair(s) failed", pairs.len()).into());
    }
    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", report.pair_key);
    println!(
        "  calendar: {} created, {} updated",
        report.events_created, report.events_updated
    );
    println!(
        "  notion:   {} created, {} updated",
        report.pages_created, report.pages_updated
    );
    println!(
        "  {} unchanged, {} skipped, {} failed",
        report.unchanged,
        report.skipped,
        report.failures.len()
    );
    for failure in &report.failures {
        println!(
            "  ! {} ({}): {}",
            failure.item_id, failure.direction, failure.message
        );
    }
    Ok(())
}
