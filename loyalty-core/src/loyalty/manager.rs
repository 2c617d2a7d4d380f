// File: loyalty-core/src/loyalty/manager.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use loyalty_common::keys::{
    points_key, user_from_points_key, COOLDOWNS_KEY, CONFIG_KEY, GOALS_KEY, LOCAL_PREFIX,
    POINTS_PREFIX, QUEUE_KEY, REDEEM_EVENT_KEY, REMOTE_PREFIX, REPLICATED_KEYS, REWARDS_KEY,
};
use loyalty_common::models::{
    Goal, LoyaltyConfig, ModuleStatus, PointsEntry, Redeem, Reward, SubscriptionId,
};
use loyalty_common::traits::{Clock, StateStore, StateStoreExt};

use crate::loyalty::migration::migrate_points;
use crate::loyalty::own_writes::OwnWrites;
use crate::loyalty::LoyaltyOptions;
use crate::modules::ModuleRegistry;
use crate::Error;

pub(crate) type CooldownTable = HashMap<String, DateTime<Utc>>;
pub(crate) type PointsTable = HashMap<String, PointsEntry>;

/// Longest cooldown that gets armed; larger values are clamped to it.
pub(crate) const MAX_COOLDOWN_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// In-memory mirror of the loyalty namespace plus the operations that mutate it.
///
/// Each aggregate sits behind its own lock. Operations that touch several
/// aggregates take every lock they need up front, always in this order:
///
/// `config -> rewards -> goals -> queue -> cooldowns -> points`
///
/// and keep them until the last write is acknowledged, so a business
/// operation (e.g. "take points and credit the goal") is one unit.
pub struct LoyaltyManager {
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) options: LoyaltyOptions,

    pub(crate) config: RwLock<LoyaltyConfig>,
    pub(crate) rewards: Mutex<Vec<Reward>>,
    pub(crate) goals: Mutex<Vec<Goal>>,
    pub(crate) queue: Mutex<Vec<Redeem>>,
    pub(crate) cooldowns: Mutex<CooldownTable>,
    pub(crate) points: Mutex<PointsTable>,

    pub(crate) own_writes: OwnWrites,
    pub(crate) dispatchers: parking_lot::Mutex<Vec<(SubscriptionId, JoinHandle<()>)>>,
}

impl LoyaltyManager {
    fn empty(registry: &ModuleRegistry, options: LoyaltyOptions) -> Self {
        Self {
            store: registry.store.clone(),
            clock: registry.clock.clone(),
            options,
            config: RwLock::new(LoyaltyConfig::default()),
            rewards: Mutex::new(Vec::new()),
            goals: Mutex::new(Vec::new()),
            queue: Mutex::new(Vec::new()),
            cooldowns: Mutex::new(HashMap::new()),
            points: Mutex::new(HashMap::new()),
            own_writes: OwnWrites::new(),
            dispatchers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Migrates legacy data, subscribes, loads the mirror and starts dispatching.
    ///
    /// Both subscriptions exist before the load begins; anything written while
    /// loading is queued on them and applied once the dispatchers start.
    pub async fn start(registry: &ModuleRegistry, options: LoyaltyOptions) -> Result<Arc<Self>, Error> {
        migrate_points(registry.store.as_ref()).await?;

        let local = registry.store.subscribe_prefix(LOCAL_PREFIX).await?;
        let remote = registry.store.subscribe_prefix(REMOTE_PREFIX).await?;

        let manager = Arc::new(Self::empty(registry, options));
        manager.load().await?;
        manager.spawn_dispatchers(local, remote);

        if let Some(replicator) = registry.replicator.clone() {
            tokio::spawn(async move {
                let keys = REPLICATED_KEYS.iter().map(|k| k.to_string()).collect();
                if let Err(e) = replicator.replicate_keys(keys).await {
                    error!("failed to replicate keys: {:?}", e);
                }
            });
        }

        info!("loyalty engine ready");
        Ok(manager)
    }

    async fn load(&self) -> Result<(), Error> {
        match load_optional::<LoyaltyConfig>(self.store.as_ref(), CONFIG_KEY).await? {
            Some(cfg) => *self.config.write().await = cfg,
            None => warn!("missing configuration for loyalty. Please make sure to set it up properly!"),
        }
        if let Some(rewards) = load_optional(self.store.as_ref(), REWARDS_KEY).await? {
            *self.rewards.lock().await = rewards;
        }
        if let Some(goals) = load_optional(self.store.as_ref(), GOALS_KEY).await? {
            *self.goals.lock().await = goals;
        }
        if let Some(queue) = load_optional(self.store.as_ref(), QUEUE_KEY).await? {
            *self.queue.lock().await = queue;
        }

        if self.options.persist_cooldowns {
            if let Some(saved) = load_optional::<CooldownTable>(self.store.as_ref(), COOLDOWNS_KEY).await? {
                let now = self.clock.now();
                let mut cooldowns = self.cooldowns.lock().await;
                cooldowns.extend(saved.into_iter().filter(|(_, until)| *until > now));
            }
        }

        let raw = self.store.get_all(POINTS_PREFIX).await?;
        let mut points = self.points.lock().await;
        for (key, value) in raw {
            let Some(user) = user_from_points_key(&key) else { continue };
            if value.is_empty() {
                continue;
            }
            match serde_json::from_str::<PointsEntry>(&value) {
                Ok(entry) => {
                    points.insert(user.to_string(), entry);
                }
                Err(e) => warn!(key = %key, "skipping unreadable points entry: {}", e),
            }
        }
        debug!(users = points.len(), "loaded point balances");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current time as seen by the engine's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn config(&self) -> LoyaltyConfig {
        self.config.read().await.clone()
    }

    pub async fn status(&self) -> ModuleStatus {
        let config = self.config.read().await;
        ModuleStatus {
            enabled: config.enabled,
            working: config.enabled,
            status_string: String::new(),
        }
    }

    /// Unknown users have a balance of 0.
    pub async fn get_points(&self, user: &str) -> i64 {
        self.points.lock().await.get(user).map(|e| e.points).unwrap_or(0)
    }

    pub async fn rewards(&self) -> Vec<Reward> {
        self.rewards.lock().await.clone()
    }

    /// Returns a reward with an empty `id` when `id` is unknown.
    pub async fn get_reward(&self, id: &str) -> Reward {
        self.rewards
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn goals(&self) -> Vec<Goal> {
        self.goals.lock().await.clone()
    }

    /// Returns a goal with an empty `id` when `id` is unknown.
    pub async fn get_goal(&self, id: &str) -> Goal {
        self.goals
            .lock()
            .await
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn queue(&self) -> Vec<Redeem> {
        self.queue.lock().await.clone()
    }

    /// Expiry of the reward's cooldown, or the UNIX epoch if none is armed.
    pub async fn get_reward_cooldown(&self, reward_id: &str) -> DateTime<Utc> {
        self.cooldowns
            .lock()
            .await
            .get(reward_id)
            .copied()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Points
    // ------------------------------------------------------------------

    pub async fn give_points(&self, batch: &HashMap<String, i64>) -> Result<(), Error> {
        let mut points = self.points.lock().await;
        for (user, delta) in batch {
            self.write_points(&mut points, user, *delta).await?;
        }
        Ok(())
    }

    pub async fn take_points(&self, batch: &HashMap<String, i64>) -> Result<(), Error> {
        let mut points = self.points.lock().await;
        for (user, delta) in batch {
            self.write_points(&mut points, user, delta.saturating_neg()).await?;
        }
        Ok(())
    }

    /// Persists `balance + delta` for `user`, then updates the mirror.
    pub(crate) async fn write_points(
        &self,
        points: &mut PointsTable,
        user: &str,
        delta: i64,
    ) -> Result<i64, Error> {
        let balance = points.get(user).map(|e| e.points).unwrap_or(0);
        let entry = PointsEntry { points: balance.saturating_add(delta) };
        self.persist_snapshot(&points_key(user), &entry).await?;
        points.insert(user.to_string(), entry);
        Ok(entry.points)
    }

    /// Writes the snapshot of a mirrored aggregate. The caller holds the
    /// aggregate's lock and updates the mirror once this returns `Ok`.
    async fn persist_snapshot<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), Error> {
        self.own_writes.begin(key);
        if let Err(e) = self.store.put_json(key, value).await {
            self.own_writes.abort(key);
            return Err(e);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Redeems
    // ------------------------------------------------------------------

    /// Queues a redeem without checking cooldown or balance.
    pub async fn add_redeem(&self, redeem: Redeem) -> Result<(), Error> {
        let mut queue = self.queue.lock().await;
        let mut cooldowns = self.cooldowns.lock().await;
        self.add_redeem_locked(&mut queue, &mut cooldowns, redeem).await
    }

    async fn add_redeem_locked(
        &self,
        queue: &mut Vec<Redeem>,
        cooldowns: &mut CooldownTable,
        redeem: Redeem,
    ) -> Result<(), Error> {
        self.store.put_json(REDEEM_EVENT_KEY, &redeem).await?;

        let mut next = queue.clone();
        next.push(redeem.clone());
        self.persist_snapshot(QUEUE_KEY, &next).await?;
        *queue = next;

        if redeem.reward.cooldown > 0 {
            let until = cooldown_until(self.clock.now(), redeem.reward.cooldown);
            cooldowns.insert(redeem.reward.id.clone(), until);
            if self.options.persist_cooldowns {
                self.store.put_json(COOLDOWNS_KEY, &*cooldowns).await?;
            }
        }
        Ok(())
    }

    /// Queues the redeem and charges the reward price. The balance is not
    /// checked and may go negative.
    pub async fn perform_redeem(&self, redeem: Redeem) -> Result<(), Error> {
        self.perform_redeem_inner(redeem, false).await
    }

    /// Like [`perform_redeem`](Self::perform_redeem) but fails with
    /// [`Error::InsufficientBalance`] instead of overdrawing.
    pub async fn perform_redeem_checked(&self, redeem: Redeem) -> Result<(), Error> {
        self.perform_redeem_inner(redeem, true).await
    }

    async fn perform_redeem_inner(&self, redeem: Redeem, forbid_overdraft: bool) -> Result<(), Error> {
        let mut queue = self.queue.lock().await;
        let mut cooldowns = self.cooldowns.lock().await;
        let mut points = self.points.lock().await;

        if let Some(until) = cooldowns.get(&redeem.reward.id) {
            if self.clock.now() < *until {
                return Err(Error::RedeemInCooldown);
            }
        }

        let price = redeem.reward.price;
        if forbid_overdraft {
            let balance = points.get(&redeem.username).map(|e| e.points).unwrap_or(0);
            if balance < price {
                return Err(Error::InsufficientBalance { balance, price });
            }
        }

        let username = redeem.username.clone();
        self.add_redeem_locked(&mut queue, &mut cooldowns, redeem).await?;
        self.write_points(&mut points, &username, price.saturating_neg()).await?;
        Ok(())
    }

    /// Removes the queued redeem matching `(when, username, reward.id)`.
    pub async fn remove_redeem(&self, redeem: &Redeem) -> Result<(), Error> {
        let mut queue = self.queue.lock().await;
        let index = queue
            .iter()
            .position(|queued| queued.same_redeem(redeem))
            .ok_or(Error::RedeemNotFound)?;

        let mut next = queue.clone();
        next.remove(index);
        self.persist_snapshot(QUEUE_KEY, &next).await?;
        *queue = next;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Goals
    // ------------------------------------------------------------------

    /// Credits `points` to the goal with `goal.id` as currently stored.
    pub async fn contribute_goal(&self, goal: &Goal, user: &str, points: i64) -> Result<(), Error> {
        let mut goals = self.goals.lock().await;
        self.contribute_locked(&mut goals, &goal.id, user, points).await
    }

    async fn contribute_locked(
        &self,
        goals: &mut Vec<Goal>,
        goal_id: &str,
        user: &str,
        points: i64,
    ) -> Result<(), Error> {
        let index = goals
            .iter()
            .position(|g| g.id == goal_id)
            .ok_or(Error::GoalNotFound)?;

        let mut next = goals.clone();
        let target = &mut next[index];
        target.contributed = target.contributed.saturating_add(points);
        let share = target.contributors.entry(user.to_string()).or_insert(0);
        *share = share.saturating_add(points);

        self.persist_snapshot(GOALS_KEY, &next).await?;
        *goals = next;
        Ok(())
    }

    /// Moves up to `points` from the user's balance into the goal and returns
    /// how much was actually contributed.
    ///
    /// The amount is clamped to the balance, then to what the goal still
    /// needs. Goal state is read from the mirror, not from `goal`.
    pub async fn perform_contribution(&self, goal: &Goal, user: &str, points: i64) -> Result<i64, Error> {
        let mut goals = self.goals.lock().await;
        let mut balances = self.points.lock().await;

        let current = goals
            .iter()
            .find(|g| g.id == goal.id)
            .ok_or(Error::GoalNotFound)?;
        if current.is_reached() {
            return Err(Error::GoalAlreadyReached);
        }

        let balance = balances.get(user).map(|e| e.points).unwrap_or(0);
        let amount = points.min(balance).min(current.remaining()).max(0);
        if amount == 0 {
            return Ok(0);
        }

        self.write_points(&mut balances, user, -amount).await?;
        if let Err(e) = self.contribute_locked(&mut goals, &goal.id, user, amount).await {
            // Give the points back so the two aggregates stay in step.
            if let Err(refund) = self.write_points(&mut balances, user, amount).await {
                error!(user = %user, amount, "failed to refund contribution: {:?}", refund);
            }
            return Err(e);
        }
        Ok(amount)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Cancels both subscriptions and stops the dispatcher tasks.
    pub async fn close(&self) -> Result<(), Error> {
        let handles: Vec<_> = self.dispatchers.lock().drain(..).collect();
        for (id, task) in handles {
            task.abort();
            if let Err(e) = self.store.unsubscribe(id).await {
                debug!(subscription = %id, "unsubscribe on close failed: {:?}", e);
            }
        }
        info!("loyalty engine closed");
        Ok(())
    }
}

/// End of a cooldown of `secs` seconds starting at `now`. Never panics: the
/// length is clamped to [`MAX_COOLDOWN_SECS`] and to the calendar's range.
fn cooldown_until(now: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    let secs = secs.clamp(0, MAX_COOLDOWN_SECS);
    Duration::try_seconds(secs)
        .and_then(|length| now.checked_add_signed(length))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `Ok(None)` when the key is unset or blank.
async fn load_optional<T: DeserializeOwned + Send>(store: &dyn StateStore, key: &str) -> Result<Option<T>, Error> {
    match store.get_json::<T>(key).await {
        Ok(v) => Ok(Some(v)),
        Err(Error::EmptyKey(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
