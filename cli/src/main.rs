//! StarkIndex CLI: runs the contract indexer against a Starknet feeder gateway.
//!
//! # Commands
//! ```text
//! starkindex run       --gateway <url>
//! starkindex register  --app <name> --start-block <n> --contract <addr>...
//! starkindex register  --file <config.json>
//! starkindex snapshot  --app <name> [--contract <addr>]
//! starkindex info
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use starkindex_core::naming::checkpoint_key;
use starkindex_core::{normalize_address, CheckpointManager, Configuration, IndexerConfig};
use starkindex_storage::sqlite::SqliteRecordStore;
use starkindex_storage::StoreConfigSource;

mod cmd_run;
mod logging;

#[derive(Parser)]
#[command(
    name = "starkindex",
    about = "Starknet contract indexer: StarkIndex CLI",
    version
)]
struct Cli {
    /// SQLite database holding records, checkpoints and configurations
    #[arg(long, global = true, default_value = "./starkindex.db")]
    db: String,

    /// Log level: trace | debug | info | warn | error
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every registered application until Ctrl-C
    Run {
        /// Feeder gateway base URL
        #[arg(long, default_value = "https://alpha-mainnet.starknet.io")]
        gateway: String,
        /// Interval between polls for newly registered applications
        #[arg(long, default_value_t = 5_000)]
        config_poll_ms: u64,
        /// Interval between checks for a changed configuration
        #[arg(long, default_value_t = 5_000)]
        watch_ms: u64,
        /// Wait before asking again for a block that is not produced yet
        #[arg(long, default_value_t = 2_000)]
        block_poll_ms: u64,
        /// Print every published notification topic
        #[arg(long)]
        print_topics: bool,
    },

    /// Register an application, replacing any with the same name
    Register {
        /// JSON file with `app_name`, `start_block` and `contracts`
        #[arg(long, conflicts_with_all = ["app", "contract"])]
        file: Option<String>,
        #[arg(long)]
        app: Option<String>,
        #[arg(long, default_value_t = 0)]
        start_block: u64,
        /// Contract address (repeatable)
        #[arg(long)]
        contract: Vec<String>,
    },

    /// Print checkpoints of an application
    Snapshot {
        #[arg(long)]
        app: String,
        /// Only this contract (default: every contract of the application)
        #[arg(long)]
        contract: Option<String>,
    },

    /// Show build and storage layout info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogConfig {
        level: cli.log_level.clone(),
        json: cli.json_logs,
        ..logging::LogConfig::default()
    });

    match cli.command {
        Commands::Run {
            gateway,
            config_poll_ms,
            watch_ms,
            block_poll_ms,
            print_topics,
        } => {
            let settings = IndexerConfig::default()
                .config_poll_interval_ms(config_poll_ms)
                .watch_interval_ms(watch_ms)
                .block_poll_interval_ms(block_poll_ms);
            cmd_run::run(cmd_run::RunArgs {
                db: &cli.db,
                gateway: &gateway,
                settings,
                print_topics,
            })
            .await
        }

        Commands::Register {
            file,
            app,
            start_block,
            contract,
        } => cmd_register(&cli.db, file.as_deref(), app, start_block, contract).await,

        Commands::Snapshot { app, contract } => cmd_snapshot(&cli.db, &app, contract.as_deref()).await,

        Commands::Info => cmd_info(),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_register(
    db: &str,
    file: Option<&str>,
    app: Option<String>,
    start_block: u64,
    contracts: Vec<String>,
) -> Result<()> {
    let config = match (file, app) {
        (Some(path), _) => {
            let raw = std::fs::read(path).with_context(|| format!("reading '{path}'"))?;
            let config: Configuration =
                serde_json::from_slice(&raw).with_context(|| format!("parsing '{path}'"))?;
            // A hash in the file is not trusted; derive it from the content.
            Configuration {
                hash: String::new(),
                ..config
            }
        }
        (None, Some(app)) => Configuration::new(app, start_block, contracts),
        (None, None) => bail!("either --file or --app is required"),
    };
    if config.contracts.is_empty() {
        bail!("application '{}' has no contracts", config.app_name);
    }

    let store = Arc::new(SqliteRecordStore::open(db).await?);
    let stored = StoreConfigSource::new(store).register(config).await?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

async fn cmd_snapshot(db: &str, app: &str, contract: Option<&str>) -> Result<()> {
    let store = Arc::new(SqliteRecordStore::open(db).await?);
    let contracts = match contract {
        Some(address) => vec![normalize_address(address)],
        None => {
            let prefix = checkpoint_key(app, "");
            let keys = store.keys_with_prefix(&prefix).await?;
            if keys.is_empty() {
                bail!("no checkpoints recorded for application '{app}'");
            }
            keys.iter()
                .filter_map(|key| key.strip_prefix(&prefix))
                .map(str::to_string)
                .collect()
        }
    };

    let checkpoints = CheckpointManager::new(store, app);
    let mut out = serde_json::Map::new();
    for address in contracts {
        let snapshot = checkpoints.load(&address).await?;
        out.insert(normalize_address(&address), serde_json::to_value(snapshot)?);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("StarkIndex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Storage keys:");
    println!("  <contract>.tx.<txHash>                  matched transaction");
    println!("  <contract>.event.<txHash>_<i>           matched event (per contract)");
    println!("  event.<txHash>_<i>                      matched event (global)");
    println!("  checkpoint.<app>.<contract>             blocks with matches + latest block");
    println!("  configs                                 registered applications");
    println!();
    println!("Notification topics:");
    println!("  <hash>.tx.<contract>.<txHash>.<timestamp>");
    println!("  <hash>.event.<contract>.<eventId>.<timestamp>");
    Ok(())
}
