//! Engine settings and application supervisor state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime knobs shared by every supervisor and pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// How often the root supervisor polls for new applications (milliseconds).
    pub config_poll_interval_ms: u64,
    /// How often an application checks whether its own configuration changed (milliseconds).
    pub watch_interval_ms: u64,
    /// Wait before asking again for a block that is not available yet (milliseconds).
    pub block_poll_interval_ms: u64,
    /// Attempts per replayed block before it is skipped.
    pub replay_retry_limit: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            config_poll_interval_ms: 5_000,
            watch_interval_ms: 5_000,
            block_poll_interval_ms: 2_000,
            replay_retry_limit: 3,
        }
    }
}

impl IndexerConfig {
    pub fn config_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config_poll_interval_ms = ms;
        self
    }

    pub fn watch_interval_ms(mut self, ms: u64) -> Self {
        self.watch_interval_ms = ms;
        self
    }

    pub fn block_poll_interval_ms(mut self, ms: u64) -> Self {
        self.block_poll_interval_ms = ms;
        self
    }

    pub fn replay_retry_limit(mut self, attempts: u32) -> Self {
        self.replay_retry_limit = attempts;
        self
    }

    pub fn config_poll_interval(&self) -> Duration {
        Duration::from_millis(self.config_poll_interval_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }
}

/// Lifecycle of an application supervisor.
///
/// ```text
/// Starting → Running(h1) → Stopping(h1 → h2) → Running(h2) → … → Stopped
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Reading checkpoints and spawning the first pipeline.
    Starting,
    /// Pipelines for this configuration hash are live.
    Running { hash: String },
    /// Old pipelines are being cancelled and awaited before `to` starts.
    Stopping { from: String, to: String },
    /// Terminated by shutdown.
    Stopped,
    /// Setup failed; the application is not retried.
    Failed { reason: String },
}

impl IndexerState {
    /// Hash of the running configuration, if any.
    pub fn running_hash(&self) -> Option<&str> {
        match self {
            Self::Running { hash } => Some(hash),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running { hash } => write!(f, "running({hash})"),
            Self::Stopping { from, to } => write!(f, "stopping({from} -> {to})"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
