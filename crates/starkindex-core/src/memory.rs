// ─── In-memory collaborators (for testing) ────────────────────────────────────
//
// Ephemeral implementations of the collaborator traits. Everything is lost
// when the process exits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::Configuration;
use crate::error::{IndexerError, IndexerResult};
use crate::ports::{ConfigSource, EventBus, RecordStore};

fn poisoned<T>(_: T) -> IndexerError {
    IndexerError::Storage("in-memory lock poisoned".into())
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys as strings, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .lock()
            .map(|d| d.keys().map(|k| String::from_utf8_lossy(k).into_owned()).collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Value of `key` without going through the async trait.
    pub fn get_sync(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().ok()?.get(key.as_bytes()).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &[u8]) -> IndexerResult<Option<Vec<u8>>> {
        Ok(self.data.lock().map_err(poisoned)?.get(key).cloned())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> IndexerResult<()> {
        self.data
            .lock()
            .map_err(poisoned)?
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

/// Event bus that records every publication in order.
#[derive(Default)]
pub struct MemoryEventBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(topic, payload)` pairs in publication order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published().into_iter().map(|(t, _)| t).collect()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> IndexerResult<()> {
        self.published
            .lock()
            .map_err(poisoned)?
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Mutable configuration set.
#[derive(Default)]
pub struct MemoryConfigSource {
    configs: Mutex<Vec<Configuration>>,
}

impl MemoryConfigSource {
    pub fn new(configs: Vec<Configuration>) -> Self {
        Self {
            configs: Mutex::new(configs),
        }
    }

    /// Replace the configuration with the same `app_name`, or append it.
    pub fn upsert(&self, config: Configuration) {
        if let Ok(mut configs) = self.configs.lock() {
            match configs.iter_mut().find(|c| c.app_name == config.app_name) {
                Some(existing) => *existing = config,
                None => configs.push(config),
            }
        }
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigSource {
    async fn get_configs(&self) -> IndexerResult<Vec<Configuration>> {
        Ok(self.configs.lock().map_err(poisoned)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_store_roundtrip() {
        let store = MemoryRecordStore::new();
        assert!(store.get(b"a.tx.1").await.unwrap().is_none());

        store.set(b"a.tx.1", b"one").await.unwrap();
        store.set(b"a.tx.1", b"uno").await.unwrap();

        assert_eq!(store.get(b"a.tx.1").await.unwrap().unwrap(), b"uno");
        assert_eq!(store.keys(), vec!["a.tx.1".to_string()]);
    }

    #[tokio::test]
    async fn config_upsert_replaces_by_app_name() {
        let source = MemoryConfigSource::new(vec![Configuration::new("a", 0, ["0x1"])]);
        source.upsert(Configuration::new("a", 0, ["0x1", "0x2"]));
        source.upsert(Configuration::new("b", 0, ["0x3"]));

        let configs = source.get_configs().await.unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].contracts.len(), 2);
    }
}
