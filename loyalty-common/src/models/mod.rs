// File: loyalty-common/src/models/mod.rs
pub mod loyalty;
pub mod remote;
pub mod status;
pub mod store;

pub use loyalty::{Goal, LoyaltyConfig, PointsConfig, PointsEntry, Redeem, Reward};
pub use remote::{RemoteContributeRequest, RemoteRedeemRequest};
pub use status::ModuleStatus;
pub use store::{ClientId, KvChange, SubscriptionId};
