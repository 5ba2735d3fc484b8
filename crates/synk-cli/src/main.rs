use clap::{Parser, Subcommand};
use synk_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "synk", version, about = "Notion and Google Calendar sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage Notion database / Google Calendar pairs
    Pair {
        #[command(subcommand)]
        action: commands::pair::PairAction,
    },
    /// Run one reconciliation pass now
    Sync {
        /// Only sync this pair (`<database_id>:<calendar_id>`)
        #[arg(long)]
        pair: Option<String>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep pairs in sync until interrupted
    Run,
    /// Sync statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which properties of a Notion database would be synced
    Schema {
        /// Notion database id
        database_id: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing() {
    let configured = Config::load()
        .map(|config| config.log.filter)
        .unwrap_or_else(|_| "info".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Pair { action } => commands::pair::run(action),
        Commands::Sync { pair, json } => commands::sync::run(pair, json),
        Commands::Run => commands::run::run(),
        Commands::Stats { json } => commands::stats::run(json),
        Commands::Schema { database_id } => commands::schema::run(&database_id),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
