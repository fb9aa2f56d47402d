//! Application supervisor: runs one configuration's pipelines and swaps them
//! out when the configuration changes.
//!
//! The supervisor is a loop over an explicit state machine:
//!
//! ```text
//! Starting ──► Running(h1) ──config change──► Stopping(h1 → h2) ──► Running(h2)
//!                   │                                                   │
//!                   └────────────────────shutdown──────────────────────┴──► Stopped
//! ```
//!
//! Stopping cancels the scope shared by the producers and the config
//! watcher, then awaits every task before the next configuration is
//! launched, so two generations of producers never write checkpoints at the
//! same time. The new generation resumes from checkpoints, not from genesis.
//!
//! Replacements are claimed through the [`SlotRegistry`] shared with the
//! root supervisor, which keeps one supervisor per configuration hash.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::address::same_address;
use crate::config::Configuration;
use crate::contract_indexer::{BlockOrigin, ContractIndexer};
use crate::error::IndexerResult;
use crate::indexer::{IndexerConfig, IndexerState};
use crate::pipeline::{BlockPipeline, PipelineBlock};
use crate::ports::{ConfigSource, Ports};
use crate::shutdown::{cancellable, cancelled, CancelHandle, CancelSignal};
use crate::slots::{SlotId, SlotRegistry};

/// Supervises the pipelines of one application slot.
pub struct AppSupervisor {
    config: Configuration,
    ports: Ports,
    settings: IndexerConfig,
    state: watch::Sender<IndexerState>,
    slots: Arc<SlotRegistry>,
    slot: SlotId,
}

/// One configuration generation: its tasks, channels and indexer.
struct Running {
    scope: CancelHandle,
    pipeline: BlockPipeline,
    watcher: JoinHandle<()>,
    blocks: mpsc::Receiver<PipelineBlock>,
    changes: mpsc::Receiver<Configuration>,
    indexer: ContractIndexer,
}

impl Running {
    async fn stop(self) {
        self.scope.cancel();
        drop(self.blocks);
        self.pipeline.join().await;
        if let Err(e) = self.watcher.await {
            error!(error = %e, "config watcher failed");
        }
    }
}

enum Transition {
    Reload(Configuration),
    Shutdown,
}

impl AppSupervisor {
    /// A supervisor with a registry of its own.
    pub fn new(config: Configuration, ports: Ports, settings: IndexerConfig) -> Self {
        let slots = Arc::new(SlotRegistry::new());
        let slot = slots.register(&config);
        Self::in_slot(config, ports, settings, slots, slot)
    }

    /// A supervisor for a slot already opened in `slots`.
    pub fn in_slot(
        config: Configuration,
        ports: Ports,
        settings: IndexerConfig,
        slots: Arc<SlotRegistry>,
        slot: SlotId,
    ) -> Self {
        let (state, _) = watch::channel(IndexerState::Starting);
        Self {
            config,
            ports,
            settings,
            state,
            slots,
            slot,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Follow the supervisor's lifecycle.
    pub fn state(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: IndexerState) {
        debug!(app = %self.config.app_name, state = %state, "supervisor state");
        self.state.send_replace(state);
    }

    /// Run until `shutdown` fires.
    ///
    /// Returns an error only if a generation cannot be set up (e.g. a
    /// checkpoint cannot be read); the application then stays down.
    pub async fn run(self, shutdown: CancelSignal) -> IndexerResult<()> {
        let slots = self.slots.clone();
        let slot = self.slot;
        let result = self.supervise(shutdown).await;
        slots.release(slot);
        result
    }

    async fn supervise(mut self, mut shutdown: CancelSignal) -> IndexerResult<()> {
        loop {
            let running = match self.launch().await {
                Ok(running) => running,
                Err(e) => {
                    self.set_state(IndexerState::Failed {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            };
            self.slots.settle(self.slot, &self.config.hash);
            self.set_state(IndexerState::Running {
                hash: self.config.hash.clone(),
            });

            match self.drive(running, &mut shutdown).await {
                Transition::Reload(next) => {
                    info!(app = %next.app_name, hash = %next.hash, "config changed");
                    self.config = next;
                }
                Transition::Shutdown => {
                    info!(app = %self.config.app_name, hash = %self.config.hash, "indexer stopped");
                    self.set_state(IndexerState::Stopped);
                    return Ok(());
                }
            }
        }
    }

    async fn launch(&self) -> IndexerResult<Running> {
        let (scope, signal) = CancelHandle::new();
        let indexer = ContractIndexer::new(&self.config, self.ports.store.clone(), self.ports.bus.clone());

        let (block_tx, blocks) = mpsc::channel(1);
        let pipeline = BlockPipeline::start(
            &self.config,
            indexer.checkpoints(),
            self.ports.blocks.clone(),
            &self.settings,
            block_tx,
            signal.clone(),
        )
        .await?;

        let (change_tx, changes) = mpsc::channel(1);
        let span = info_span!("watch", app = %self.config.app_name);
        let watcher = tokio::spawn(
            watch_config(
                self.ports.configs.clone(),
                self.slots.clone(),
                self.slot,
                self.settings.watch_interval(),
                change_tx,
                signal,
            )
            .instrument(span),
        );

        info!(
            app = %self.config.app_name,
            hash = %self.config.hash,
            contracts = self.config.contracts.len(),
            "indexer started"
        );

        Ok(Running {
            scope,
            pipeline,
            watcher,
            blocks,
            changes,
            indexer,
        })
    }

    async fn drive(&self, mut running: Running, shutdown: &mut CancelSignal) -> Transition {
        loop {
            tokio::select! {
                _ = cancelled(shutdown) => {
                    running.stop().await;
                    return Transition::Shutdown;
                }
                Some(next) = running.changes.recv() => {
                    self.set_state(IndexerState::Stopping {
                        from: self.config.hash.clone(),
                        to: next.hash.clone(),
                    });
                    running.stop().await;
                    return Transition::Reload(next);
                }
                Some(item) = running.blocks.recv() => {
                    trace!(
                        origin = %item.origin,
                        phase = ?item.phase,
                        block = item.block.block_number,
                        "block received"
                    );
                    self.index_block(&running.indexer, &item).await;
                }
            }
        }
    }

    /// Index a delivered block for every contract of the configuration.
    /// Failures are logged per contract and never stop the loop.
    async fn index_block(&self, indexer: &ContractIndexer, item: &PipelineBlock) {
        for contract in &self.config.contracts {
            let origin = if same_address(&contract.address, &item.origin) {
                BlockOrigin::Own
            } else {
                BlockOrigin::Peer
            };
            if let Err(e) = indexer.index_from(contract, &item.block, origin).await {
                error!(
                    app = %self.config.app_name,
                    contract = %contract.address,
                    block = item.block.block_number,
                    phase = ?item.phase,
                    error = %e,
                    "failed to index block"
                );
            }
        }
    }
}

/// Poll the config source until the slot's configuration has been replaced,
/// then send the replacement and stop.
///
/// The replacement is claimed in `slots` before it is sent.
async fn watch_config(
    source: Arc<dyn ConfigSource>,
    slots: Arc<SlotRegistry>,
    slot: SlotId,
    interval: Duration,
    tx: mpsc::Sender<Configuration>,
    mut signal: CancelSignal,
) {
    loop {
        if cancellable(&mut signal, tokio::time::sleep(interval)).await.is_none() {
            return;
        }
        let configs = match cancellable(&mut signal, source.get_configs()).await {
            None => return,
            Some(Ok(configs)) => configs,
            Some(Err(e)) => {
                warn!(error = %e, "failed to check configuration");
                continue;
            }
        };
        if let Some(next) = slots.claim_replacement(slot, &configs) {
            debug!(to = %next.hash, "configuration change detected");
            let _ = cancellable(&mut signal, tx.send(next)).await;
            return;
        }
    }
}
