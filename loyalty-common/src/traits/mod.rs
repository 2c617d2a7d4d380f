// File: loyalty-common/src/traits/mod.rs
pub mod clock;
pub mod collaborator_traits;
pub mod state_store;

pub use clock::{Clock, SystemClock};
pub use collaborator_traits::{ChatPresence, KeyReplicator};
pub use state_store::{StateStore, StateStoreExt, Subscription};
