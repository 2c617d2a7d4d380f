// File: loyalty-common/src/models/store.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one connection to the key-value hub.
pub type ClientId = Uuid;

pub type SubscriptionId = Uuid;

/// A single key change delivered to prefix subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvChange {
    pub key: String,
    pub data: String,
    /// Client that performed the write.
    pub origin: ClientId,
}
