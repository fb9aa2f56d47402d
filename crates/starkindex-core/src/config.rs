//! Application configurations and the snapshot poller.
//!
//! A [`Configuration`] describes one application: which contracts to index
//! and from which block. Its `hash` is the identity used to detect changes,
//! to key pipelines and to build pub/sub topics.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::address::normalize_address;
use crate::ports::ConfigSource;
use crate::shutdown::{cancellable, CancelSignal};

/// A contract to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: String,
}

impl Contract {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// One application to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Human label. Also the slot a running application is identified by
    /// when its configuration changes.
    pub app_name: String,
    /// Content hash; empty in hand-written files until [`Configuration::with_hash`].
    #[serde(default)]
    pub hash: String,
    /// Blocks below this number are never indexed for this application.
    #[serde(default)]
    pub start_block: u64,
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

impl Configuration {
    /// Build a configuration and derive its hash from the content.
    pub fn new<I, A>(app_name: impl Into<String>, start_block: u64, addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            app_name: app_name.into(),
            hash: String::new(),
            start_block,
            contracts: addresses.into_iter().map(Contract::new).collect(),
        }
        .with_hash()
    }

    /// Lowercase hex SHA-256 over the name, start block and normalized
    /// contract addresses, each field terminated by a zero byte. Equal
    /// content always yields an equal hash.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.app_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.start_block.to_be_bytes());
        for contract in &self.contracts {
            hasher.update(normalize_address(&contract.address).as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Fill in `hash` if it is empty.
    pub fn with_hash(mut self) -> Self {
        if self.hash.is_empty() {
            self.hash = self.content_hash();
        }
        self
    }
}

/// Configurations from `observed` whose hash is absent from `known`.
///
/// Order follows `observed`; a hash repeated within `observed` is returned
/// once. Configurations missing from `observed` are never reported.
pub fn config_diff(known: &[Configuration], observed: &[Configuration]) -> Vec<Configuration> {
    let mut seen: HashSet<&str> = known.iter().map(|c| c.hash.as_str()).collect();
    observed
        .iter()
        .filter(|c| seen.insert(c.hash.as_str()))
        .cloned()
        .collect()
}

/// Spawn a task that sends the full configuration set every `interval`.
///
/// Load errors are logged and skipped. The task ends when `cancel` fires or
/// the receiver is dropped.
pub fn spawn_config_poller(
    source: Arc<dyn ConfigSource>,
    interval: Duration,
    mut cancel: CancelSignal,
) -> (mpsc::Receiver<Vec<Configuration>>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        loop {
            if cancellable(&mut cancel, tokio::time::sleep(interval)).await.is_none() {
                return;
            }
            let configs = match cancellable(&mut cancel, source.get_configs()).await {
                None => return,
                Some(Ok(configs)) => configs,
                Some(Err(e)) => {
                    warn!(error = %e, "failed to poll configurations");
                    continue;
                }
            };
            debug!(count = configs.len(), "polled configurations");
            match cancellable(&mut cancel, tx.send(configs)).await {
                None | Some(Err(_)) => return,
                Some(Ok(())) => {}
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_yields_equal_hash() {
        let a = Configuration::new("carbon", 10, ["0xABC"]);
        let b = Configuration::new("carbon", 10, ["0x0abc"]);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);

        let c = Configuration::new("carbon", 11, ["0xabc"]);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn field_boundaries_change_the_hash() {
        let one = Configuration::new("app", 0, ["0x1", "0x2"]);
        let two = Configuration::new("app", 0, ["0x2", "0x1"]);
        assert_ne!(one.hash, two.hash);
        assert_ne!(
            Configuration::new("ab", 0, ["0x1"]).hash,
            Configuration::new("a", 0, ["0x1"]).hash
        );
    }

    #[test]
    fn explicit_hash_is_kept() {
        let cfg: Configuration = serde_json::from_str(
            r#"{"app_name": "a", "hash": "H1", "start_block": 0, "contracts": []}"#,
        )
        .unwrap();
        assert_eq!(cfg.with_hash().hash, "H1");
    }

    #[test]
    fn missing_hash_is_derived() {
        let cfg: Configuration =
            serde_json::from_str(r#"{"app_name": "a", "contracts": [{"address": "0x1"}]}"#)
                .unwrap();
        let cfg = cfg.with_hash();
        assert_eq!(cfg.hash, Configuration::new("a", 0, ["0x1"]).hash);
    }

    #[test]
    fn diff_contains_only_unknown_hashes() {
        let a = Configuration::new("a", 0, ["0x1"]);
        let b = Configuration::new("b", 0, ["0x2"]);
        let c = Configuration::new("c", 0, ["0x3"]);

        let diff = config_diff(&[a.clone(), b.clone()], &[a.clone(), c.clone(), b.clone()]);
        assert_eq!(diff, vec![c]);
    }

    #[test]
    fn unchanged_set_produces_empty_diff() {
        let known = vec![Configuration::new("a", 0, ["0x1"]), Configuration::new("b", 5, ["0x2"])];
        assert!(config_diff(&known, &known.clone()).is_empty());
    }

    #[test]
    fn removals_are_not_reported() {
        let a = Configuration::new("a", 0, ["0x1"]);
        let b = Configuration::new("b", 0, ["0x2"]);
        assert!(config_diff(&[a, b.clone()], &[b]).is_empty());
    }

    #[test]
    fn repeated_new_hash_is_reported_once() {
        let a = Configuration::new("a", 0, ["0x1"]);
        assert_eq!(config_diff(&[], &[a.clone(), a.clone()]), vec![a]);
    }
}
