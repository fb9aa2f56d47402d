//! Storage keys and pub/sub topic names.
//!
//! Topics are consumed by existing subscribers and must stay byte-for-byte
//! stable:
//!
//! ```text
//! <appHash>.tx.<contract>.<txHash>.<unixTimestamp>
//! <appHash>.event.<contract>.<eventId>.<unixTimestamp>
//! ```
//!
//! Callers pass addresses already normalized; these helpers only format.

/// Key under which the full configuration set is kept by store-backed config sources.
pub const CONFIGS_KEY: &str = "configs";

pub fn tx_topic(app_hash: &str, contract: &str, tx_hash: &str, timestamp: u64) -> String {
    format!("{app_hash}.tx.{contract}.{tx_hash}.{timestamp}")
}

pub fn event_topic(app_hash: &str, contract: &str, event_id: &str, timestamp: u64) -> String {
    format!("{app_hash}.event.{contract}.{event_id}.{timestamp}")
}

/// `"<txHash>_<index of the event within its transaction>"`.
pub fn event_id(tx_hash: &str, index: usize) -> String {
    format!("{tx_hash}_{index}")
}

pub fn tx_key(contract: &str, tx_hash: &str) -> String {
    format!("{contract}.tx.{tx_hash}")
}

/// Per-contract event index.
pub fn contract_event_key(contract: &str, event_id: &str) -> String {
    format!("{contract}.event.{event_id}")
}

/// Global event index.
pub fn event_key(event_id: &str) -> String {
    format!("event.{event_id}")
}

/// Checkpoint of one contract within one application slot.
pub fn checkpoint_key(app_name: &str, contract: &str) -> String {
    format!("checkpoint.{app_name}.{contract}")
}
