//! starkindex-core: the orchestration engine behind the StarkIndex event indexer.
//!
//! # Architecture
//!
//! ```text
//! RootSupervisor ── config poller (ConfigSource)
//!     └── AppSupervisor (one per application)
//!             ├── config watcher         (hot reload on hash change)
//!             ├── BlockPipeline          (replay + live task per contract)
//!             ├── ContractIndexer        (match, store, publish)
//!             └── CheckpointManager      (restart without re-scan)
//! ```
//!
//! Chain access, persistence, publication and configuration discovery are
//! collaborators behind the traits in [`ports`].

pub mod address;
pub mod checkpoint;
pub mod config;
pub mod contract_indexer;
pub mod cursor;
pub mod error;
pub mod indexer;
pub mod memory;
pub mod naming;
pub mod pipeline;
pub mod ports;
pub mod root;
pub mod shutdown;
pub mod slots;
pub mod supervisor;
pub mod types;

pub use address::normalize_address;
pub use checkpoint::{CheckpointManager, ContractSnapshot};
pub use config::{config_diff, Configuration, Contract};
pub use contract_indexer::{BlockOrigin, ContractIndexer, IndexOutcome};
pub use cursor::ResumePoint;
pub use error::{IndexerError, IndexerResult};
pub use indexer::{IndexerConfig, IndexerState};
pub use pipeline::{BlockPipeline, IndexPhase, PipelineBlock};
pub use ports::{BlockSource, ConfigSource, EventBus, Ports, RecordStore};
pub use root::RootSupervisor;
pub use shutdown::{CancelHandle, CancelSignal};
pub use slots::{Admission, SlotId, SlotRegistry};
pub use supervisor::AppSupervisor;
pub use types::{Block, Event, Transaction, TransactionReceipt};
