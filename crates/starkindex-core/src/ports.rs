//! Collaborator traits.
//!
//! The engine talks to the chain, the key/value store, the pub/sub bus and
//! the configuration store only through these narrow interfaces, so any
//! backend (in-memory, SQLite, HTTP gateway, …) can be plugged in.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Configuration;
use crate::error::IndexerResult;
use crate::types::Block;

/// Fetches blocks by number.
///
/// Retry and timeout policy belong to the implementation; the engine treats
/// every error as transient.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, block_number: u64) -> IndexerResult<Block>;
}

/// Byte-key / byte-value store shared by every indexer.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns `None` when the key was never written.
    async fn get(&self, key: &[u8]) -> IndexerResult<Option<Vec<u8>>>;

    async fn set(&self, key: &[u8], value: &[u8]) -> IndexerResult<()>;
}

/// Publish side of the notification bus. Delivery is fire-and-forget.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> IndexerResult<()>;
}

/// Yields the full current set of application configurations.
///
/// Change notification is done by polling this method; the engine computes
/// diffs between successive snapshots itself.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn get_configs(&self) -> IndexerResult<Vec<Configuration>>;
}

/// Handles to every collaborator, cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct Ports {
    pub blocks: Arc<dyn BlockSource>,
    pub store: Arc<dyn RecordStore>,
    pub bus: Arc<dyn EventBus>,
    pub configs: Arc<dyn ConfigSource>,
}

impl Ports {
    pub fn new(
        blocks: Arc<dyn BlockSource>,
        store: Arc<dyn RecordStore>,
        bus: Arc<dyn EventBus>,
        configs: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            blocks,
            store,
            bus,
            configs,
        }
    }
}
