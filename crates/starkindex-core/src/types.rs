//! Chain data as seen by the indexer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A fetched block. Immutable once returned by a [`BlockSource`](crate::ports::BlockSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_number: u64,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub transaction_receipts: Vec<TransactionReceipt>,
}

impl Block {
    /// An empty block, mostly useful for tests and placeholders.
    pub fn empty(block_number: u64, timestamp: u64) -> Self {
        Self {
            block_number,
            timestamp,
            transactions: vec![],
            transaction_receipts: vec![],
        }
    }

    /// Number of events across all receipts.
    pub fn event_count(&self) -> usize {
        self.transaction_receipts.iter().map(|r| r.events.len()).sum()
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_hash: String,
    /// Account that sent the transaction. Absent for deploys and L1 handlers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub calldata: Vec<String>,
}

// ─── Receipts & events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub transaction_index: u64,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// An event emitted by a contract.
///
/// `event_id` and `recorded_at` are not part of chain data: the indexer
/// assigns them when the event is matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub from_address: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
            keys: vec![],
            data: vec![],
            event_id: None,
            recorded_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_deserializes_with_missing_collections() {
        let block: Block =
            serde_json::from_str(r#"{"block_number": 7, "timestamp": 1700000000}"#).unwrap();
        assert_eq!(block, Block::empty(7, 1_700_000_000));
    }

    #[test]
    fn transaction_type_field_is_renamed() {
        let tx: Transaction = serde_json::from_str(
            r#"{"transaction_hash": "0xaa", "sender_address": "0x1", "type": "INVOKE_FUNCTION"}"#,
        )
        .unwrap();
        assert_eq!(tx.kind.as_deref(), Some("INVOKE_FUNCTION"));
        assert!(tx.calldata.is_empty());
    }

    #[test]
    fn unassigned_event_fields_are_not_serialized() {
        let json = serde_json::to_value(Event::new("0x1")).unwrap();
        assert!(json.get("event_id").is_none());
        assert!(json.get("recorded_at").is_none());
    }

    #[test]
    fn event_count_sums_receipts() {
        let mut block = Block::empty(1, 0);
        for hash in ["0xa", "0xb"] {
            block.transaction_receipts.push(TransactionReceipt {
                transaction_hash: hash.into(),
                transaction_index: 0,
                events: vec![Event::new("0x1"), Event::new("0x2")],
            });
        }
        assert_eq!(block.event_count(), 4);
    }
}
