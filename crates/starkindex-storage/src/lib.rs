//! starkindex-storage: collaborator backends for StarkIndex.
//!
//! Backends:
//! - [`MemoryRecordStore`]: in-memory records (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//! - [`bus`]: in-process broadcast notification bus
//! - [`config_source`]: configurations persisted in a record store

pub mod bus;
pub mod config_source;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use bus::{InMemoryEventBus, Notification, Subscription};
pub use config_source::StoreConfigSource;
pub use starkindex_core::memory::MemoryRecordStore;
