// File: loyalty-common/src/traits/clock.rs

use chrono::{DateTime, Utc};

/// Source of "now" for cooldowns and redeem timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
