// File: loyalty-common/src/keys.rs
//! Key names owned by the loyalty engine inside the shared key-value store.

/// Everything the engine owns lives under this prefix.
pub const LOCAL_PREFIX: &str = "loyalty/";

pub const CONFIG_KEY: &str = "loyalty/config";
pub const REWARDS_KEY: &str = "loyalty/rewards";
pub const GOALS_KEY: &str = "loyalty/goals";
pub const QUEUE_KEY: &str = "loyalty/redeem-queue";

/// One key per user: `loyalty/points/<username>`.
pub const POINTS_PREFIX: &str = "loyalty/points/";

/// Fire-and-forget notification written on every redeem.
pub const REDEEM_EVENT_KEY: &str = "loyalty/@redeem";

// Write-only "command" keys: writing a Redeem here asks the engine to act on it.
pub const CREATE_REDEEM_RPC: &str = "loyalty/@create-redeem";
pub const REMOVE_REDEEM_RPC: &str = "loyalty/@remove-redeem";

/// Only written when cooldown persistence is turned on.
pub const COOLDOWNS_KEY: &str = "loyalty/cooldowns";

/// Pre-0.1 storage: a single `{user: points}` map.
pub const LEGACY_POINTS_KEY: &str = "loyalty/users";

/// Requests forwarded by the replication service.
pub const REMOTE_PREFIX: &str = "stulbe/loyalty/";
pub const REMOTE_REDEEM_KEY: &str = "stulbe/loyalty/@redeem-rpc";
pub const REMOTE_CONTRIBUTE_KEY: &str = "stulbe/loyalty/@contribute-rpc";

/// Keys mirrored to the remote service at startup.
pub const REPLICATED_KEYS: [&str; 5] = [CONFIG_KEY, REWARDS_KEY, GOALS_KEY, QUEUE_KEY, POINTS_PREFIX];

pub fn points_key(user: &str) -> String {
    format!("{POINTS_PREFIX}{user}")
}

/// Returns the username for a points key, or `None` if `key` is not one.
pub fn user_from_points_key(key: &str) -> Option<&str> {
    key.strip_prefix(POINTS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_key_round_trip() {
        let key = points_key("kitty");
        assert_eq!(key, "loyalty/points/kitty");
        assert_eq!(user_from_points_key(&key), Some("kitty"));
        assert_eq!(user_from_points_key(CONFIG_KEY), None);
    }

    #[test]
    fn test_local_keys_share_prefix() {
        for key in [CONFIG_KEY, REWARDS_KEY, GOALS_KEY, QUEUE_KEY, CREATE_REDEEM_RPC, REMOVE_REDEEM_RPC] {
            assert!(key.starts_with(LOCAL_PREFIX));
        }
        assert!(REMOTE_REDEEM_KEY.starts_with(REMOTE_PREFIX));
        assert!(!REMOTE_PREFIX.starts_with(LOCAL_PREFIX));
    }
}
