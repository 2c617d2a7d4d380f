// File: loyalty-common/src/models/remote.rs
//! Request shapes forwarded by the replication service.

use serde::{Deserialize, Serialize};

/// Written to `stulbe/loyalty/@redeem-rpc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRedeemRequest {
    pub username: String,
    pub display_name: String,
    pub reward_id: String,
    #[serde(default)]
    pub request_text: String,
}

/// Written to `stulbe/loyalty/@contribute-rpc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContributeRequest {
    pub goal_id: String,
    pub username: String,
    pub amount: i64,
}
