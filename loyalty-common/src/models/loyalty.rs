// File: loyalty-common/src/models/loyalty.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Balance stored under `loyalty/points/<user>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEntry {
    pub points: i64,
}

/// Automatic point-award policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsConfig {
    /// Seconds between awards; 0 disables the award loop.
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub amount: i64,
    /// Extra points for chatters that spoke since the last award.
    #[serde(default)]
    pub activity_bonus: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Display name of the points currency, e.g. "maows".
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub banlist: Vec<String>,
}

impl LoyaltyConfig {
    pub fn is_banned(&self, user: &str) -> bool {
        self.banlist.iter().any(|b| b.eq_ignore_ascii_case(user))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    /// Hint shown to the user about what to put in the request text.
    #[serde(default)]
    pub required_info: String,
    #[serde(default)]
    pub enabled: bool,
    /// Cooldown in seconds; 0 means none.
    #[serde(default)]
    pub cooldown: i64,
}

/// Community goal that many users contribute points towards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "total")]
    pub total_goal: i64,
    #[serde(default)]
    pub contributed: i64,
    #[serde(default)]
    pub contributors: HashMap<String, i64>,
    #[serde(default)]
    pub enabled: bool,
}

impl Goal {
    pub fn remaining(&self) -> i64 {
        (self.total_goal - self.contributed).max(0)
    }

    pub fn is_reached(&self) -> bool {
        self.contributed >= self.total_goal
    }
}

/// A recorded exchange of points for a reward.
///
/// There is no id field: a redeem is identified by `(when, username, reward.id)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redeem {
    pub username: String,
    pub display_name: String,
    pub when: DateTime<Utc>,
    /// Snapshot of the reward at redeem time.
    pub reward: Reward,
    #[serde(default)]
    pub request_text: String,
}

impl Redeem {
    pub fn same_redeem(&self, other: &Redeem) -> bool {
        self.when == other.when
            && self.username == other.username
            && self.reward.id == other.reward.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_goal_json_uses_total_field() {
        let raw = r#"{"id":"g1","name":"New mic","total":1000,"contributed":900,"contributors":{"a":900},"enabled":true}"#;
        let goal: Goal = serde_json::from_str(raw).unwrap();
        assert_eq!(goal.total_goal, 1000);
        assert_eq!(goal.remaining(), 100);
        assert!(!goal.is_reached());

        let back = serde_json::to_value(&goal).unwrap();
        assert_eq!(back["total"], 1000);
    }

    #[test]
    fn test_config_defaults_when_fields_missing() {
        let cfg: LoyaltyConfig = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.points.interval, 0);
        assert!(cfg.banlist.is_empty());
    }

    #[test]
    fn test_banlist_is_case_insensitive() {
        let cfg = LoyaltyConfig {
            banlist: vec!["Nightbot".into()],
            ..Default::default()
        };
        assert!(cfg.is_banned("nightbot"));
        assert!(!cfg.is_banned("kitty"));
    }

    #[test]
    fn test_same_redeem_ignores_display_fields() {
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let reward = Reward { id: "hydrate".into(), price: 50, ..Default::default() };
        let a = Redeem {
            username: "kitty".into(),
            display_name: "Kitty".into(),
            when,
            reward: reward.clone(),
            request_text: "one".into(),
        };
        let mut b = a.clone();
        b.display_name = "KITTY".into();
        b.request_text = "two".into();
        assert!(a.same_redeem(&b));

        b.when = when + chrono::Duration::milliseconds(1);
        assert!(!a.same_redeem(&b));
    }
}
