//! src/store/mod.rs
//!
//! In-process key-value hub with prefix subscriptions. The hub owns a
//! [`KvBackend`] for durability and fans every write out to the matching
//! subscribers, including the client that wrote it.

pub mod backend;
pub mod client;
pub mod hub;
pub mod postgres;

pub use backend::{KvBackend, MemoryBackend};
pub use client::LocalClient;
pub use hub::{HubResponse, KvHub};
pub use postgres::PostgresBackend;
