//! Error types for the indexing engine.

use thiserror::Error;

/// Errors that can occur while indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Block source error: {0}")]
    Source(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Publish error on '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{} failure(s) while indexing block {block_number} for {contract}: {}", failures.len(), failures.join("; "))]
    PartialIndex {
        contract: String,
        block_number: u64,
        failures: Vec<String>,
    },
}

impl IndexerError {
    /// Returns `true` if some matches of a block could not be stored or published.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialIndex { .. })
    }
}

pub type IndexerResult<T> = Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_index_message_lists_failures() {
        let err = IndexerError::PartialIndex {
            contract: "0x1".into(),
            block_number: 42,
            failures: vec!["store tx 0xa".into(), "publish event 0xb_0".into()],
        };
        assert!(err.is_partial());
        assert_eq!(
            err.to_string(),
            "2 failure(s) while indexing block 42 for 0x1: store tx 0xa; publish event 0xb_0"
        );
    }
}
