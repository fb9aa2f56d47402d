//! HTTP block source backed by `reqwest`.
//!
//! Transport failures and 5xx responses are retried with a doubling backoff.
//! Gateway error bodies (block not found, invalid block number) are returned
//! at once; the live pipeline asks again on its own schedule.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use starkindex_core::error::{IndexerError, IndexerResult};
use starkindex_core::ports::BlockSource;
use starkindex_core::types::Block;

use crate::feeder::decode_block;

/// Configuration for [`FeederGatewayClient`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub request_timeout: Duration,
    /// Attempts per fetch for transient failures, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

enum FetchError {
    Transient(String),
    Final(IndexerError),
}

/// Starknet feeder-gateway client.
pub struct FeederGatewayClient {
    base_url: String,
    http: reqwest::Client,
    config: GatewayConfig,
}

impl FeederGatewayClient {
    /// Create a client for a gateway such as `https://alpha-mainnet.starknet.io`.
    pub fn new(base_url: impl Into<String>, config: GatewayConfig) -> IndexerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            config,
        })
    }

    pub fn default_for(base_url: impl Into<String>) -> IndexerResult<Self> {
        Self::new(base_url, GatewayConfig::default())
    }

    pub fn block_url(&self, block_number: u64) -> String {
        format!(
            "{}/feeder_gateway/get_block?blockNumber={block_number}",
            self.base_url
        )
    }

    async fn fetch_once(&self, block_number: u64) -> Result<Block, FetchError> {
        let resp = self
            .http
            .get(self.block_url(block_number))
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        // The gateway reports unknown blocks with a 4xx/5xx and an error body.
        match decode_block(&body, block_number) {
            Ok(block) if status.is_success() => Ok(block),
            Ok(_) => Err(FetchError::Transient(format!("HTTP {}", status.as_u16()))),
            Err(e) if status.is_server_error() && !looks_like_gateway_error(&body) => {
                Err(FetchError::Transient(format!("HTTP {}: {e}", status.as_u16())))
            }
            Err(e) => Err(FetchError::Final(e)),
        }
    }
}

fn looks_like_gateway_error(body: &[u8]) -> bool {
    serde_json::from_slice::<crate::feeder::GatewayError>(body).is_ok()
}

#[async_trait]
impl BlockSource for FeederGatewayClient {
    async fn fetch_block(&self, block_number: u64) -> IndexerResult<Block> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.fetch_once(block_number).await {
                Ok(block) => {
                    debug!(block = block_number, txs = block.transactions.len(), "block fetched");
                    return Ok(block);
                }
                Err(FetchError::Final(e)) => return Err(e),
                Err(FetchError::Transient(reason)) if attempt < self.config.max_attempts => {
                    warn!(
                        block = block_number,
                        attempt,
                        delay_ms = backoff.as_millis() as u64,
                        error = %reason,
                        "retrying block fetch"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(FetchError::Transient(reason)) => {
                    return Err(IndexerError::Source(format!(
                        "block {block_number}: {reason} after {attempt} attempts"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_url_strips_trailing_slash() {
        let client = FeederGatewayClient::default_for("https://gateway.example/").unwrap();
        assert_eq!(
            client.block_url(7),
            "https://gateway.example/feeder_gateway/get_block?blockNumber=7"
        );
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_source_error() {
        let config = GatewayConfig {
            request_timeout: Duration::from_millis(200),
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
        };
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let client = FeederGatewayClient::new("http://127.0.0.1:9", config).unwrap();
        let err = client.fetch_block(1).await.unwrap_err();
        assert!(matches!(err, IndexerError::Source(_)));
    }
}
