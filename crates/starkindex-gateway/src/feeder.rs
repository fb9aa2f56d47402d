//! Feeder-gateway JSON shapes and their mapping to indexer types.
//!
//! Only the fields the indexer uses are decoded; everything else in the
//! gateway response is ignored.

use serde::Deserialize;

use starkindex_core::error::{IndexerError, IndexerResult};
use starkindex_core::types::{Block, Event, Transaction, TransactionReceipt};

/// `get_block` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    /// Absent for the pending block.
    pub block_number: Option<u64>,
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
    #[serde(default)]
    pub transaction_receipts: Vec<RawReceipt>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub transaction_hash: String,
    pub sender_address: Option<String>,
    /// Older invoke transactions carry the account here instead.
    pub contract_address: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub calldata: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub transaction_index: u64,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub from_address: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub data: Vec<String>,
}

/// Error body returned by the gateway, e.g. for a block not yet produced.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl From<RawTransaction> for Transaction {
    fn from(raw: RawTransaction) -> Self {
        Self {
            transaction_hash: raw.transaction_hash,
            sender_address: raw.sender_address.or(raw.contract_address),
            kind: raw.kind,
            calldata: raw.calldata,
        }
    }
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        Self {
            from_address: raw.from_address,
            keys: raw.keys,
            data: raw.data,
            event_id: None,
            recorded_at: None,
        }
    }
}

impl From<RawReceipt> for TransactionReceipt {
    fn from(raw: RawReceipt) -> Self {
        Self {
            transaction_hash: raw.transaction_hash,
            transaction_index: raw.transaction_index,
            events: raw.events.into_iter().map(Event::from).collect(),
        }
    }
}

impl RawBlock {
    /// Convert to a [`Block`], checking it is the block that was asked for.
    pub fn into_block(self, requested: u64) -> IndexerResult<Block> {
        match self.block_number {
            Some(n) if n == requested => {}
            other => {
                return Err(IndexerError::Source(format!(
                    "gateway returned block {other:?} for block {requested}"
                )))
            }
        }
        Ok(Block {
            block_number: requested,
            timestamp: self.timestamp,
            transactions: self.transactions.into_iter().map(Transaction::from).collect(),
            transaction_receipts: self
                .transaction_receipts
                .into_iter()
                .map(TransactionReceipt::from)
                .collect(),
        })
    }
}

/// Decode a `get_block` body. Gateway error bodies become `Source` errors.
pub fn decode_block(body: &[u8], requested: u64) -> IndexerResult<Block> {
    if let Ok(err) = serde_json::from_slice::<GatewayError>(body) {
        return Err(IndexerError::Source(format!(
            "block {requested}: {} {}",
            err.code, err.message
        )));
    }
    let raw: RawBlock = serde_json::from_slice(body)
        .map_err(|e| IndexerError::Source(format!("block {requested}: undecodable body: {e}")))?;
    raw.into_block(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"{
        "block_hash": "0x5d3",
        "parent_block_hash": "0x5d2",
        "block_number": 42,
        "state_root": "0x0",
        "status": "ACCEPTED_ON_L2",
        "timestamp": 1700000042,
        "transactions": [
            {
                "transaction_hash": "0xaa",
                "version": "0x1",
                "sender_address": "0x123",
                "calldata": ["0x1", "0x2"],
                "type": "INVOKE_FUNCTION"
            },
            {
                "transaction_hash": "0xbb",
                "contract_address": "0x456",
                "entry_point_selector": "0x9",
                "calldata": [],
                "type": "INVOKE_FUNCTION"
            },
            {
                "transaction_hash": "0xcc",
                "class_hash": "0x7",
                "type": "DECLARE"
            }
        ],
        "transaction_receipts": [
            {
                "transaction_hash": "0xaa",
                "transaction_index": 0,
                "actual_fee": "0x10",
                "events": [
                    {"from_address": "0x123", "keys": ["0xk"], "data": ["0xd1", "0xd2"]}
                ]
            },
            {"transaction_hash": "0xbb", "transaction_index": 1, "events": []}
        ]
    }"#;

    #[test]
    fn decodes_gateway_block() {
        let block = decode_block(BLOCK.as_bytes(), 42).unwrap();
        assert_eq!(block.block_number, 42);
        assert_eq!(block.timestamp, 1_700_000_042);
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(block.transactions[0].sender_address.as_deref(), Some("0x123"));
        assert_eq!(block.transactions[0].calldata, vec!["0x1", "0x2"]);
        assert_eq!(block.event_count(), 1);
        assert_eq!(block.transaction_receipts[0].events[0].data.len(), 2);
    }

    #[test]
    fn sender_falls_back_to_contract_address() {
        let block = decode_block(BLOCK.as_bytes(), 42).unwrap();
        assert_eq!(block.transactions[1].sender_address.as_deref(), Some("0x456"));
        assert_eq!(block.transactions[2].sender_address, None);
        assert_eq!(block.transactions[2].kind.as_deref(), Some("DECLARE"));
    }

    #[test]
    fn block_not_found_is_a_source_error() {
        let body = br#"{"code": "StarknetErrorCode.BLOCK_NOT_FOUND", "message": "Block number 99 was not found."}"#;
        let err = decode_block(body, 99).unwrap_err();
        assert!(matches!(err, IndexerError::Source(ref m) if m.contains("BLOCK_NOT_FOUND")));
    }

    #[test]
    fn mismatched_block_number_is_rejected() {
        assert!(decode_block(BLOCK.as_bytes(), 43).is_err());
    }
}
