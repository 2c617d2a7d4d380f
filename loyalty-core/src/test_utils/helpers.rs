// File: loyalty-core/src/test_utils/helpers.rs

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use loyalty_common::keys::{points_key, CONFIG_KEY, GOALS_KEY, REWARDS_KEY};
use loyalty_common::models::{Goal, LoyaltyConfig, PointsEntry, Reward};
use loyalty_common::traits::{Clock, StateStoreExt};

use crate::db::Database;
use crate::loyalty::{LoyaltyManager, LoyaltyOptions};
use crate::modules::ModuleRegistry;
use crate::store::{KvHub, LocalClient, MemoryBackend};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A memory-backed hub, one client on it and a manual clock.
pub struct TestEnv {
    pub hub: KvHub,
    pub store: Arc<LocalClient>,
    pub clock: Arc<ManualClock>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let hub = KvHub::spawn(Arc::new(MemoryBackend::new()));
        let store = Arc::new(hub.connect());
        Self { hub, store, clock: Arc::new(ManualClock::default()) }
    }

    pub fn registry(&self) -> ModuleRegistry {
        ModuleRegistry::builder()
            .with_store(self.store.clone())
            .with_clock(self.clock.clone())
            .build()
            .expect("store is set")
    }

    pub async fn start(&self, options: LoyaltyOptions) -> Arc<LoyaltyManager> {
        LoyaltyManager::start(&self.registry(), options)
            .await
            .expect("engine should start")
    }

    pub async fn start_default(&self) -> Arc<LoyaltyManager> {
        self.start(LoyaltyOptions::default()).await
    }

    /// A second client on the same hub, as another process would have.
    pub fn other_client(&self) -> LocalClient {
        self.hub.connect()
    }

    pub async fn seed_points(&self, user: &str, points: i64) {
        self.store
            .put_json(&points_key(user), &PointsEntry { points })
            .await
            .expect("seed points");
    }

    pub async fn seed_rewards(&self, rewards: &[Reward]) {
        self.store.put_json(REWARDS_KEY, &rewards).await.expect("seed rewards");
    }

    pub async fn seed_goals(&self, goals: &[Goal]) {
        self.store.put_json(GOALS_KEY, &goals).await.expect("seed goals");
    }

    pub async fn seed_config(&self, config: &LoyaltyConfig) {
        self.store.put_json(CONFIG_KEY, config).await.expect("seed config");
    }
}

pub fn reward(id: &str, price: i64, cooldown: i64) -> Reward {
    Reward {
        id: id.to_string(),
        name: id.to_string(),
        price,
        enabled: true,
        cooldown,
        ..Default::default()
    }
}

/// Polls `check` until it returns true or roughly a second has passed.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}

/// Migrated handle to the database named by `TEST_DATABASE_URL`, or `None`
/// when the variable is unset so Postgres-backed tests can bail out early.
pub async fn test_database() -> Option<Database> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    Some(Database::connect(&url).await.expect("TEST_DATABASE_URL should point at a reachable database"))
}
