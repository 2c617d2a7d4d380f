// File: loyalty-core/src/modules.rs
//! Typed set of collaborators the loyalty engine is started with.

use std::sync::Arc;

use loyalty_common::traits::{Clock, KeyReplicator, StateStore, SystemClock};

use crate::Error;

/// Everything resolved here is checked once, in [`ModuleRegistryBuilder::build`].
#[derive(Clone)]
pub struct ModuleRegistry {
    pub store: Arc<dyn StateStore>,
    pub clock: Arc<dyn Clock>,
    /// Optional: replication is skipped when no replicator is registered.
    pub replicator: Option<Arc<dyn KeyReplicator>>,
}

impl ModuleRegistry {
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }
}

#[derive(Default)]
pub struct ModuleRegistryBuilder {
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    replicator: Option<Arc<dyn KeyReplicator>>,
}

impl ModuleRegistryBuilder {
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_replicator(mut self, replicator: Arc<dyn KeyReplicator>) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// Fails with [`Error::MissingModule`] when the store is not set.
    /// The clock falls back to the system clock.
    pub fn build(self) -> Result<ModuleRegistry, Error> {
        let store = self.store.ok_or_else(|| Error::MissingModule("store".to_string()))?;
        Ok(ModuleRegistry {
            store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            replicator: self.replicator,
        })
    }
}
