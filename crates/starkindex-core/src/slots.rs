//! Which configuration hashes have a live pipeline, and who runs them.
//!
//! The root supervisor admits new configurations and each application
//! supervisor's watcher claims replacements. Both go through one lock, so a
//! hash is never served by two supervisors at once.
//!
//! `app_name` is only a label: several configurations may share it. A
//! supervisor takes a same-name configuration as its replacement only once
//! its own hash has left the configuration set.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::Configuration;

/// Identifies one application supervisor.
pub type SlotId = u64;

#[derive(Debug)]
struct Slot {
    app_name: String,
    /// Hashes whose pipelines may be alive: the running one, plus the
    /// replacement while the old generation is stopping.
    hashes: Vec<String>,
}

#[derive(Debug, Default)]
struct Slots {
    next_id: SlotId,
    slots: HashMap<SlotId, Slot>,
}

impl Slots {
    fn serves(&self, hash: &str) -> bool {
        self.slots.values().any(|s| s.hashes.iter().any(|h| h == hash))
    }
}

/// Outcome of [`SlotRegistry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new slot was opened for the configuration.
    Admitted(SlotId),
    /// Some supervisor already serves this hash.
    Served,
    /// A same-name supervisor lost its configuration and will claim this
    /// one as its replacement; ask again with a later snapshot.
    Deferred,
}

/// Shared record of served hashes.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    inner: Mutex<Slots>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Updates never panic halfway.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a slot for `config` unconditionally.
    pub fn register(&self, config: &Configuration) -> SlotId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.insert(
            id,
            Slot {
                app_name: config.app_name.clone(),
                hashes: vec![config.hash.clone()],
            },
        );
        id
    }

    /// Decide whether `config`, found in the `observed` set, needs a new
    /// supervisor.
    pub fn admit(&self, config: &Configuration, observed: &[Configuration]) -> Admission {
        let mut inner = self.lock();
        if inner.serves(&config.hash) {
            return Admission::Served;
        }
        let orphaned = inner.slots.values().any(|s| {
            s.app_name == config.app_name
                && !s.hashes.iter().any(|h| observed.iter().any(|c| &c.hash == h))
        });
        if orphaned {
            return Admission::Deferred;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.insert(
            id,
            Slot {
                app_name: config.app_name.clone(),
                hashes: vec![config.hash.clone()],
            },
        );
        Admission::Admitted(id)
    }

    /// Claim a replacement for `slot` if its configuration left `observed`.
    ///
    /// The replacement is the first configuration with the same name whose
    /// hash nobody serves. The slot then serves both hashes until
    /// [`settle`](Self::settle).
    pub fn claim_replacement(&self, slot: SlotId, observed: &[Configuration]) -> Option<Configuration> {
        let mut inner = self.lock();
        let current = inner.slots.get(&slot)?;
        if current.hashes.iter().any(|h| observed.iter().any(|c| &c.hash == h)) {
            return None;
        }
        let app_name = current.app_name.clone();
        let next = observed
            .iter()
            .find(|c| c.app_name == app_name && !inner.serves(&c.hash))?
            .clone();
        if let Some(s) = inner.slots.get_mut(&slot) {
            s.hashes.push(next.hash.clone());
        }
        Some(next)
    }

    /// The old generation of `slot` is gone; only `hash` remains served.
    pub fn settle(&self, slot: SlotId, hash: &str) {
        if let Some(s) = self.lock().slots.get_mut(&slot) {
            s.hashes.retain(|h| h == hash);
        }
    }

    /// The supervisor of `slot` has exited.
    pub fn release(&self, slot: SlotId) {
        self.lock().slots.remove(&slot);
    }

    /// Number of open slots.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
