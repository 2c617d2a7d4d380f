//! loyalty-server/src/context.rs
//!
//! Everything the server wires together at startup.

use std::sync::Arc;
use tracing::info;

use loyalty_core::loyalty::LoyaltyOptions;
use loyalty_core::store::{KvBackend, KvHub, MemoryBackend, PostgresBackend};
use loyalty_core::tasks::ActivityTracker;
use loyalty_core::{Database, Error, LoyaltyManager, ModuleRegistry};

use crate::console::ConsolePresence;
use crate::Args;

pub struct ServerContext {
    pub hub: KvHub,
    pub engine: Arc<LoyaltyManager>,
    pub activity: Arc<ActivityTracker>,
    pub presence: Arc<ConsolePresence>,
}

impl ServerContext {
    pub async fn new(args: &Args) -> Result<Self, Error> {
        let backend: Arc<dyn KvBackend> = match &args.db_url {
            Some(url) => {
                let db = Database::connect(url).await?;
                Arc::new(PostgresBackend::from_database(&db))
            }
            None => {
                info!("No database URL given; using an in-memory store.");
                Arc::new(MemoryBackend::new())
            }
        };

        let hub = KvHub::spawn(backend);
        let registry = ModuleRegistry::builder()
            .with_store(Arc::new(hub.connect()))
            .build()?;

        let options = LoyaltyOptions {
            persist_cooldowns: args.persist_cooldowns,
            allow_remote_overdraft: !args.deny_remote_overdraft,
        };
        let engine = LoyaltyManager::start(&registry, options).await?;

        Ok(Self {
            hub,
            engine,
            activity: Arc::new(ActivityTracker::new()),
            presence: Arc::new(ConsolePresence::new(!args.offline)),
        })
    }
}
