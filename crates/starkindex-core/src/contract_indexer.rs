//! Contract indexer: matches a block against one contract, persists the
//! matches, publishes notifications and advances the checkpoint.
//!
//! Storage layout (addresses normalized):
//!
//! ```text
//! <contract>.tx.<txHash>         matched transaction
//! <contract>.event.<eventId>     matched event, per-contract index
//! event.<eventId>                matched event, global index
//! ```
//!
//! Writes are idempotent: indexing a block twice overwrites the same keys
//! with the same content. Notifications are re-published, so subscribers see
//! at-least-once delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, trace};

use crate::address::normalize_address;
use crate::checkpoint::CheckpointManager;
use crate::config::{Configuration, Contract};
use crate::error::{IndexerError, IndexerResult};
use crate::naming;
use crate::ports::{EventBus, RecordStore};
use crate::types::{Block, Event};

/// Whether the indexed block came from this contract's own pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    /// Delivered by the contract's own replay or live task; advances `latest_block`.
    Own,
    /// Delivered by another contract's pipeline; only matches are recorded.
    Peer,
}

/// What a successful `index` call found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub block_number: u64,
    pub transactions: usize,
    pub events: usize,
}

impl IndexOutcome {
    pub fn matched(&self) -> bool {
        self.transactions > 0 || self.events > 0
    }
}

/// Indexes blocks for the contracts of one configuration.
pub struct ContractIndexer {
    app_hash: String,
    store: Arc<dyn RecordStore>,
    bus: Arc<dyn EventBus>,
    checkpoints: CheckpointManager,
}

impl ContractIndexer {
    pub fn new(config: &Configuration, store: Arc<dyn RecordStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            app_hash: config.hash.clone(),
            checkpoints: CheckpointManager::new(store.clone(), config.app_name.clone()),
            store,
            bus,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Index `block` for `contract` as delivered by its own pipeline.
    pub async fn index(&self, contract: &Contract, block: &Block) -> IndexerResult<IndexOutcome> {
        self.index_from(contract, block, BlockOrigin::Own).await
    }

    /// Index `block` for `contract`.
    ///
    /// Transaction matching, event matching and the checkpoint update are all
    /// attempted even if one of them fails. Individual store/publish failures
    /// are logged and collected into [`IndexerError::PartialIndex`].
    pub async fn index_from(
        &self,
        contract: &Contract,
        block: &Block,
        origin: BlockOrigin,
    ) -> IndexerResult<IndexOutcome> {
        let address = normalize_address(&contract.address);
        let mut failures = Vec::new();

        let transactions = self.index_transactions(&address, block, &mut failures).await;
        let events = self.index_events(&address, block, &mut failures).await;

        let outcome = IndexOutcome {
            block_number: block.block_number,
            transactions,
            events,
        };

        if let Err(e) = self
            .checkpoints
            .record_block(
                &address,
                block.block_number,
                outcome.matched(),
                origin == BlockOrigin::Own,
            )
            .await
        {
            error!(contract = %address, block = block.block_number, error = %e, "failed to save checkpoint");
            failures.push(format!("checkpoint: {e}"));
        }

        trace!(
            contract = %address,
            block = block.block_number,
            transactions,
            events,
            "block indexed"
        );

        if failures.is_empty() {
            Ok(outcome)
        } else {
            Err(IndexerError::PartialIndex {
                contract: address,
                block_number: block.block_number,
                failures,
            })
        }
    }

    async fn index_transactions(&self, address: &str, block: &Block, failures: &mut Vec<String>) -> usize {
        let mut matched = 0;
        for tx in &block.transactions {
            let Some(sender) = tx.sender_address.as_deref() else {
                continue;
            };
            if normalize_address(sender) != address {
                continue;
            }
            matched += 1;

            match serde_json::to_vec(tx) {
                Ok(bytes) => {
                    let key = naming::tx_key(address, &tx.transaction_hash);
                    if let Err(e) = self.store.set(key.as_bytes(), &bytes).await {
                        error!(key = %key, error = %e, "failed to store transaction");
                        failures.push(format!("store {key}: {e}"));
                    }
                }
                Err(e) => {
                    error!(tx = %tx.transaction_hash, error = %e, "failed to encode transaction");
                    failures.push(format!("encode tx {}: {e}", tx.transaction_hash));
                }
            }
            info!(address, tx = %tx.transaction_hash, "indexing tx for address");

            let topic = naming::tx_topic(&self.app_hash, address, &tx.transaction_hash, block.timestamp);
            self.publish(&topic, tx.transaction_hash.as_bytes(), failures).await;
        }
        matched
    }

    async fn index_events(&self, address: &str, block: &Block, failures: &mut Vec<String>) -> usize {
        let recorded_at = i64::try_from(block.timestamp)
            .ok()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
        let mut matched = 0;
        for receipt in &block.transaction_receipts {
            for (idx, event) in receipt.events.iter().enumerate() {
                if normalize_address(&event.from_address) != address {
                    continue;
                }
                matched += 1;

                let event_id = naming::event_id(&receipt.transaction_hash, idx);
                let record = Event {
                    event_id: Some(event_id.clone()),
                    recorded_at,
                    ..event.clone()
                };

                match serde_json::to_vec(&record) {
                    Ok(bytes) => {
                        for key in [
                            naming::contract_event_key(address, &event_id),
                            naming::event_key(&event_id),
                        ] {
                            if let Err(e) = self.store.set(key.as_bytes(), &bytes).await {
                                error!(key = %key, error = %e, "failed to store event");
                                failures.push(format!("store {key}: {e}"));
                            }
                        }
                    }
                    Err(e) => {
                        error!(event_id = %event_id, error = %e, "failed to encode event");
                        failures.push(format!("encode event {event_id}: {e}"));
                    }
                }

                let topic = naming::event_topic(&self.app_hash, address, &event_id, block.timestamp);
                self.publish(&topic, event_id.as_bytes(), failures).await;
                info!(address, event_id = %event_id, "indexing event for address");
            }
        }
        matched
    }

    async fn publish(&self, topic: &str, payload: &[u8], failures: &mut Vec<String>) {
        if let Err(e) = self.bus.publish(topic, payload).await {
            error!(topic, error = %e, "failed to publish notification");
            failures.push(format!("publish {topic}: {e}"));
        }
    }
}
