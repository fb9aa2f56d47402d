//! Configurations persisted in the record store.
//!
//! The whole set lives under [`CONFIGS_KEY`] as a JSON array. Registering a
//! configuration whose `app_name` already exists replaces it, which is what
//! a running application supervisor picks up as a configuration change.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use starkindex_core::config::Configuration;
use starkindex_core::error::IndexerResult;
use starkindex_core::naming::CONFIGS_KEY;
use starkindex_core::ports::{ConfigSource, RecordStore};

/// [`ConfigSource`] reading from and writing to a [`RecordStore`].
pub struct StoreConfigSource {
    store: Arc<dyn RecordStore>,
    // Serializes read-modify-write in `register`.
    write_lock: Mutex<()>,
}

impl StoreConfigSource {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> IndexerResult<Vec<Configuration>> {
        match self.store.get(CONFIGS_KEY.as_bytes()).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Insert `config`, replacing any configuration with the same `app_name`.
    ///
    /// A missing hash is derived from the content. Returns the stored
    /// configuration.
    pub async fn register(&self, config: Configuration) -> IndexerResult<Configuration> {
        let config = config.with_hash();
        let _guard = self.write_lock.lock().await;

        let mut configs = self.load().await?;
        let replaced = match configs.iter_mut().find(|c| c.app_name == config.app_name) {
            Some(existing) => {
                *existing = config.clone();
                true
            }
            None => {
                configs.push(config.clone());
                false
            }
        };
        let bytes = serde_json::to_vec(&configs)?;
        self.store.set(CONFIGS_KEY.as_bytes(), &bytes).await?;

        info!(app = %config.app_name, hash = %config.hash, replaced, "configuration registered");
        Ok(config)
    }
}

#[async_trait]
impl ConfigSource for StoreConfigSource {
    async fn get_configs(&self) -> IndexerResult<Vec<Configuration>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(Configuration::with_hash)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starkindex_core::memory::MemoryRecordStore;

    #[tokio::test]
    async fn empty_store_has_no_configurations() {
        let source = StoreConfigSource::new(Arc::new(MemoryRecordStore::new()));
        assert!(source.get_configs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_replaces_by_app_name() {
        let store = Arc::new(MemoryRecordStore::new());
        let source = StoreConfigSource::new(store.clone());

        let v1 = source.register(Configuration::new("app", 0, ["0x1"])).await.unwrap();
        source.register(Configuration::new("other", 5, ["0x2"])).await.unwrap();
        let v2 = source
            .register(Configuration::new("app", 0, ["0x1", "0x3"]))
            .await
            .unwrap();

        let configs = source.get_configs().await.unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].app_name, "app");
        assert_eq!(configs[0].hash, v2.hash);
        assert_ne!(v1.hash, v2.hash);
        assert!(store.get_sync(CONFIGS_KEY).is_some());
    }

    #[tokio::test]
    async fn hand_written_entries_get_a_hash() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .set(
                CONFIGS_KEY.as_bytes(),
                br#"[{"app_name": "app", "start_block": 10, "contracts": [{"address": "0x1"}]}]"#,
            )
            .await
            .unwrap();
        let source = StoreConfigSource::new(store);

        let configs = source.get_configs().await.unwrap();
        assert_eq!(configs[0].hash, Configuration::new("app", 10, ["0x1"]).hash);
    }
}
