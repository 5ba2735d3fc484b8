use clap::Subcommand;
use synk_core::sync::{PairRegistry, PairState};
use synk_core::SyncPair;

use super::open_store;

#[derive(Subcommand)]
pub enum PairAction {
    /// Link a Notion database to a Google Calendar
    Add {
        /// Notion database id
        database_id: String,
        /// Google Calendar id (e.g. "primary")
        calendar_id: String,
    },
    /// Unlink a pair
    Remove {
        database_id: String,
        calendar_id: String,
    },
    /// List configured pairs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: PairAction) -> Result<(), Box<dyn std::error::Error>> {
    let registry = PairRegistry::load(open_store()?)?;

    match action {
        PairAction::Add {
            database_id,
            calendar_id,
        } => {
            let pair = SyncPair::new(database_id, calendar_id);
            if registry.add(pair.clone())? {
                println!("Pair added: {}", pair.key());
            } else {
                println!("Pair already exists: {}", pair.key());
            }
        }
        PairAction::Remove {
            database_id,
            calendar_id,
        } => {
            let key = SyncPair::new(database_id, calendar_id).key();
            if !registry.remove(&key)? {
                return Err(format!("unknown pair: {key}").into());
            }
            println!("Pair removed: {key}");
        }
        PairAction::List { json } => {
            let pairs = registry.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&pairs)?);
            } else if pairs.is_empty() {
                println!("No sync pairs configured.");
            } else {
                for status in pairs {
                    let state = match status.state {
                        PairState::Active => "active",
                        PairState::Paused => "paused",
                        PairState::Blocked => "blocked",
                    };
                    println!("{}  [{state}]", status.key);
                }
            }
        }
    }
    Ok(())
}
