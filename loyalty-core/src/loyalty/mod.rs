// File: loyalty-core/src/loyalty/mod.rs
//! Loyalty ledger: point balances, rewards, community goals and the
//! redemption queue, mirrored in memory and persisted to the state store.

pub mod dispatcher;
pub mod manager;
pub mod migration;
mod own_writes;

use serde::{Deserialize, Serialize};

pub use manager::LoyaltyManager;

/// Behaviour switches for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyOptions {
    /// Keep armed reward cooldowns across restarts (stored under `loyalty/cooldowns`).
    #[serde(default)]
    pub persist_cooldowns: bool,
    /// Let redeem requests coming from the replication service push a balance
    /// below zero. The chat command always checks the balance itself.
    #[serde(default = "default_allow_remote_overdraft")]
    pub allow_remote_overdraft: bool,
}

fn default_allow_remote_overdraft() -> bool {
    true
}

impl Default for LoyaltyOptions {
    fn default() -> Self {
        Self {
            persist_cooldowns: false,
            allow_remote_overdraft: default_allow_remote_overdraft(),
        }
    }
}
