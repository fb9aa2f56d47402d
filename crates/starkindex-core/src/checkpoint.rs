//! Checkpoint manager: per-contract progress for restart without re-scan.
//!
//! A [`ContractSnapshot`] records which blocks contained matches for a
//! contract and the highest block fully processed. Snapshots live in the
//! shared [`RecordStore`] under [`checkpoint_key`], keyed by application name
//! so they survive configuration changes (which change the hash, not the
//! name).

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::normalize_address;
use crate::cursor::ResumePoint;
use crate::error::IndexerResult;
use crate::naming::checkpoint_key;
use crate::ports::RecordStore;

/// Persisted progress of one contract within one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    /// Blocks found to contain at least one match, ascending.
    pub blocks: BTreeSet<u64>,
    /// Highest block number processed. Never decreases.
    pub latest_block: u64,
}

impl ContractSnapshot {
    /// Record that `block_number` was processed.
    ///
    /// Returns `true` if the snapshot changed.
    pub fn record(&mut self, block_number: u64, matched: bool) -> bool {
        let mut changed = false;
        if matched {
            changed |= self.blocks.insert(block_number);
        }
        if block_number > self.latest_block {
            self.latest_block = block_number;
            changed = true;
        }
        changed
    }

    /// Record a match without touching `latest_block`.
    pub fn record_match(&mut self, block_number: u64) -> bool {
        self.blocks.insert(block_number)
    }
}

/// Reads and writes contract snapshots for one application.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn RecordStore>,
    app_name: String,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn RecordStore>, app_name: impl Into<String>) -> Self {
        Self {
            store,
            app_name: app_name.into(),
        }
    }

    fn key(&self, contract: &str) -> Vec<u8> {
        checkpoint_key(&self.app_name, &normalize_address(contract)).into_bytes()
    }

    /// Load the snapshot of `contract` (`None` if never written).
    pub async fn load(&self, contract: &str) -> IndexerResult<Option<ContractSnapshot>> {
        match self.store.get(&self.key(contract)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, contract: &str, snapshot: &ContractSnapshot) -> IndexerResult<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store.set(&self.key(contract), &bytes).await
    }

    /// Where a fresh pipeline for `contract` should replay from and resume at.
    pub async fn resume_point(&self, contract: &str, start_block: u64) -> IndexerResult<ResumePoint> {
        let snapshot = self.load(contract).await?;
        Ok(ResumePoint::from_snapshot(snapshot.as_ref(), start_block))
    }

    /// Record a processed block and persist the snapshot if it changed.
    ///
    /// `advance` controls whether `latest_block` may move; blocks delivered
    /// by another contract's pipeline only add matches.
    pub async fn record_block(
        &self,
        contract: &str,
        block_number: u64,
        matched: bool,
        advance: bool,
    ) -> IndexerResult<ContractSnapshot> {
        let mut snapshot = self.load(contract).await?.unwrap_or_default();
        let changed = if advance {
            snapshot.record(block_number, matched)
        } else {
            matched && snapshot.record_match(block_number)
        };
        if changed {
            self.save(contract, &snapshot).await?;
            debug!(
                app = %self.app_name,
                contract,
                block = block_number,
                latest = snapshot.latest_block,
                "checkpoint saved"
            );
        }
        Ok(snapshot)
    }
}
