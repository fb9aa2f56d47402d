//! Resume point: where a fresh pipeline picks up a contract.

use serde::{Deserialize, Serialize};

use crate::checkpoint::ContractSnapshot;

/// Replay set and live starting block derived from a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// Previously matching blocks to re-deliver, ascending.
    pub replay: Vec<u64>,
    /// First block of the live tail.
    pub live_from: u64,
}

impl ResumePoint {
    /// Without a snapshot the live tail starts at `start_block`. With one it
    /// starts right after `latest_block`, never below `start_block`.
    /// Replayed blocks below `start_block` are dropped.
    pub fn from_snapshot(snapshot: Option<&ContractSnapshot>, start_block: u64) -> Self {
        match snapshot {
            None => Self {
                replay: vec![],
                live_from: start_block,
            },
            Some(snap) => Self {
                replay: snap.blocks.range(start_block..).copied().collect(),
                live_from: start_block.max(snap.latest_block.saturating_add(1)),
            },
        }
    }
}
