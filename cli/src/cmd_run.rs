//! `starkindex run`: index every registered application until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use starkindex_core::{CancelHandle, IndexerConfig, Ports, RootSupervisor};
use starkindex_gateway::FeederGatewayClient;
use starkindex_storage::sqlite::SqliteRecordStore;
use starkindex_storage::{InMemoryEventBus, StoreConfigSource};

pub struct RunArgs<'a> {
    pub db: &'a str,
    pub gateway: &'a str,
    pub settings: IndexerConfig,
    /// Print every notification topic to stdout.
    pub print_topics: bool,
}

pub async fn run(args: RunArgs<'_>) -> Result<()> {
    let store = Arc::new(
        SqliteRecordStore::open(args.db)
            .await
            .with_context(|| format!("opening database '{}'", args.db))?,
    );
    let blocks = Arc::new(
        FeederGatewayClient::default_for(args.gateway).context("building gateway client")?,
    );
    let bus = Arc::new(InMemoryEventBus::new());
    let configs = Arc::new(StoreConfigSource::new(store.clone()));

    if args.print_topics {
        let mut subscription = bus.subscribe("");
        tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                println!("{}", notification.topic);
            }
        });
    }

    let (shutdown, signal) = CancelHandle::new();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "unable to listen for Ctrl-C, shutting down"),
        }
        shutdown.cancel();
    });

    let records = store.record_count().await.context("counting stored records")?;
    info!(db = args.db, gateway = args.gateway, records, "starting indexer");
    let ports = Ports::new(blocks, store, bus.clone(), configs);
    RootSupervisor::new(ports, args.settings)
        .run(signal)
        .await
        .context("root supervisor failed")?;

    info!(notifications = bus.published_count(), "indexer stopped");
    Ok(())
}
