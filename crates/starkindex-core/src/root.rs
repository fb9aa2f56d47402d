//! Root supervisor: starts one [`AppSupervisor`] per application and keeps
//! picking up applications registered later.
//!
//! The set of known configurations is owned by the root loop and updated
//! only from snapshots received by value from the poller task. Every diff
//! entry goes through the [`SlotRegistry`]: it gets a supervisor of its own
//! unless its hash is already served or a same-name supervisor is about to
//! take it over as a replacement.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::{config_diff, spawn_config_poller, Configuration};
use crate::error::IndexerResult;
use crate::indexer::{IndexerConfig, IndexerState};
use crate::ports::Ports;
use crate::shutdown::{cancelled, CancelSignal};
use crate::slots::{Admission, SlotId, SlotRegistry};
use crate::supervisor::AppSupervisor;

struct AppHandle {
    app_name: String,
    state: watch::Receiver<IndexerState>,
    task: JoinHandle<()>,
}

/// Discovers applications and owns their supervisors.
pub struct RootSupervisor {
    ports: Ports,
    settings: IndexerConfig,
    slots: Arc<SlotRegistry>,
    apps: HashMap<SlotId, AppHandle>,
}

impl RootSupervisor {
    pub fn new(ports: Ports, settings: IndexerConfig) -> Self {
        Self {
            ports,
            settings,
            slots: Arc::new(SlotRegistry::new()),
            apps: HashMap::new(),
        }
    }

    /// Application name and state of every supervisor started so far.
    pub fn states(&self) -> Vec<(String, IndexerState)> {
        let mut states: Vec<_> = self
            .apps
            .iter()
            .map(|(slot, app)| (*slot, app.app_name.clone(), app.state.borrow().clone()))
            .collect();
        states.sort_by_key(|(slot, _, _)| *slot);
        states.into_iter().map(|(_, name, state)| (name, state)).collect()
    }

    /// Run until `shutdown` fires.
    ///
    /// Fails only if the initial configuration load fails: without any
    /// configuration there is nothing to index.
    pub async fn run(mut self, mut shutdown: CancelSignal) -> IndexerResult<()> {
        let initial = self.ports.configs.get_configs().await.map_err(|e| {
            error!(error = %e, "unable to retrieve configurations");
            e
        })?;
        let mut known = Vec::new();
        self.start_apps(config_diff(&[], &initial), &initial, &mut known, &shutdown);
        info!(apps = self.apps.len(), "root supervisor started");

        let (mut snapshots, poller) = spawn_config_poller(
            self.ports.configs.clone(),
            self.settings.config_poll_interval(),
            shutdown.clone(),
        );

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => break,
                snapshot = snapshots.recv() => {
                    let Some(observed) = snapshot else {
                        cancelled(&mut shutdown).await;
                        break;
                    };
                    let diff = config_diff(&known, &observed);
                    if diff.is_empty() {
                        continue;
                    }
                    self.start_apps(diff, &observed, &mut known, &shutdown);
                }
            }
        }

        if let Err(e) = poller.await {
            error!(error = %e, "config poller failed");
        }
        let tasks = self.apps.into_values().map(|app| app.task);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "application supervisor panicked");
            }
        }
        info!("root supervisor stopped");
        Ok(())
    }

    /// Start supervisors for the `diff` entries of `observed`.
    ///
    /// Entries left for a same-name supervisor stay out of `known`, so the
    /// next snapshot offers them again if that supervisor never claims them.
    fn start_apps(
        &mut self,
        diff: Vec<Configuration>,
        observed: &[Configuration],
        known: &mut Vec<Configuration>,
        shutdown: &CancelSignal,
    ) {
        for config in diff {
            match self.slots.admit(&config, observed) {
                Admission::Admitted(slot) => {
                    self.start_app(slot, config.clone(), shutdown);
                    known.push(config);
                }
                Admission::Served => {
                    debug!(app = %config.app_name, hash = %config.hash, "configuration already served");
                    known.push(config);
                }
                Admission::Deferred => {
                    debug!(app = %config.app_name, hash = %config.hash, "configuration left to its application supervisor");
                }
            }
        }
    }

    fn start_app(&mut self, slot: SlotId, config: Configuration, shutdown: &CancelSignal) {
        info!(app = %config.app_name, hash = %config.hash, "indexer started");
        let name = config.app_name.clone();
        let hash = config.hash.clone();
        let supervisor = AppSupervisor::in_slot(
            config,
            self.ports.clone(),
            self.settings.clone(),
            self.slots.clone(),
            slot,
        );
        let state = supervisor.state();
        let signal = shutdown.clone();
        let span = info_span!("app", app = %name);
        let task = tokio::spawn(
            async move {
                if let Err(e) = supervisor.run(signal).await {
                    error!(hash = %hash, error = %e, "failed to start indexer");
                }
            }
            .instrument(span),
        );
        self.apps.retain(|_, app| !app.task.is_finished());
        self.apps.insert(
            slot,
            AppHandle {
                app_name: name,
                state,
                task,
            },
        );
    }
}
