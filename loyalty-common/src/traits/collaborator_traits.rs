// File: loyalty-common/src/traits/collaborator_traits.rs
//! Boundaries to services that live outside the loyalty core.

use async_trait::async_trait;
use crate::Error;

/// Mirrors keys of the local store to the remote service.
#[async_trait]
pub trait KeyReplicator: Send + Sync {
    /// Keys ending in `/` are treated as prefixes.
    async fn replicate_keys(&self, keys: Vec<String>) -> Result<(), Error>;
}

/// What the points award loop needs to know about the live channel.
#[async_trait]
pub trait ChatPresence: Send + Sync {
    async fn is_stream_online(&self) -> Result<bool, Error>;
    async fn list_chatters(&self) -> Result<Vec<String>, Error>;
}
