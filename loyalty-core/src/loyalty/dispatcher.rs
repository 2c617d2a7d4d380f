//! src/loyalty/dispatcher.rs
//!
//! Applies store notifications to the engine's mirror. Two standing
//! subscriptions feed it: the engine's own `loyalty/` namespace and the
//! `stulbe/loyalty/` namespace carrying requests from the replication service.
//!
//! Failures here are logged, never returned: the writer already got its ack.

use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use loyalty_common::keys::{
    user_from_points_key, CONFIG_KEY, CREATE_REDEEM_RPC, GOALS_KEY, QUEUE_KEY, REMOTE_CONTRIBUTE_KEY,
    REMOTE_REDEEM_KEY, REMOVE_REDEEM_RPC, REWARDS_KEY,
};
use loyalty_common::models::{
    Goal, KvChange, LoyaltyConfig, PointsEntry, Redeem, RemoteContributeRequest, RemoteRedeemRequest,
    Reward,
};
use loyalty_common::traits::Subscription;

use crate::loyalty::manager::LoyaltyManager;
use crate::Error;

fn decode<T: DeserializeOwned>(change: &KvChange) -> Result<T, Error> {
    if change.data.is_empty() {
        return Err(Error::EmptyKey(change.key.clone()));
    }
    Ok(serde_json::from_str(&change.data)?)
}

/// Keys whose value is a full snapshot of a mirrored aggregate.
fn is_snapshot_key(key: &str) -> bool {
    matches!(key, CONFIG_KEY | REWARDS_KEY | GOALS_KEY | QUEUE_KEY) || user_from_points_key(key).is_some()
}

impl LoyaltyManager {
    pub(crate) fn spawn_dispatchers(self: &Arc<Self>, local: Subscription, remote: Subscription) {
        let local_id = local.id;
        let remote_id = remote.id;
        let local_task = spawn_dispatch_loop(Arc::downgrade(self), local, false);
        let remote_task = spawn_dispatch_loop(Arc::downgrade(self), remote, true);

        let mut dispatchers = self.dispatchers.lock();
        dispatchers.push((local_id, local_task));
        dispatchers.push((remote_id, remote_task));
    }

    /// Applies a batch from the local namespace. A bad key is logged and
    /// skipped; the rest of the batch still applies.
    ///
    /// The echo of a snapshot this engine wrote is already in the mirror.
    /// Snapshots from other writers that the hub ordered before such a write
    /// are dropped once they get the aggregate's lock (see `OwnWrites`).
    pub async fn apply_local_changes(&self, changes: &[KvChange]) {
        let own_id = self.store.client_id();
        for change in changes {
            if change.origin == own_id && is_snapshot_key(&change.key) && self.own_writes.confirm(&change.key) {
                trace!(key = %change.key, "own write confirmed");
                continue;
            }
            match self.apply_local_change(change).await {
                Ok(()) => debug!(key = %change.key, "updated key"),
                Err(e) => error!(key = %change.key, error = %e, "subscribe error: could not apply change on key"),
            }
        }
    }

    async fn apply_local_change(&self, change: &KvChange) -> Result<(), Error> {
        match change.key.as_str() {
            CONFIG_KEY => {
                let config: LoyaltyConfig = decode(change)?;
                let mut current = self.config.write().await;
                if self.admit(change) {
                    *current = config;
                }
            }
            REWARDS_KEY => {
                let rewards: Vec<Reward> = decode(change)?;
                let mut current = self.rewards.lock().await;
                if self.admit(change) {
                    *current = rewards;
                }
            }
            GOALS_KEY => {
                let goals: Vec<Goal> = decode(change)?;
                let mut current = self.goals.lock().await;
                if self.admit(change) {
                    *current = goals;
                }
            }
            QUEUE_KEY => {
                let queue: Vec<Redeem> = decode(change)?;
                let mut current = self.queue.lock().await;
                if self.admit(change) {
                    *current = queue;
                }
            }
            CREATE_REDEEM_RPC => {
                let redeem: Redeem = decode(change)?;
                self.add_redeem(redeem).await?;
            }
            REMOVE_REDEEM_RPC => {
                let redeem: Redeem = decode(change)?;
                self.remove_redeem(&redeem).await?;
            }
            key => {
                if let Some(user) = user_from_points_key(key) {
                    // An empty value is how a balance gets deleted.
                    let entry = if change.data.is_empty() {
                        None
                    } else {
                        Some(decode::<PointsEntry>(change)?)
                    };
                    let mut points = self.points.lock().await;
                    if !self.admit(change) {
                        return Ok(());
                    }
                    match entry {
                        Some(entry) => points.insert(user.to_string(), entry),
                        None => points.remove(user),
                    };
                }
            }
        }
        Ok(())
    }

    /// Must be called with the lock of the aggregate `change.key` belongs to.
    fn admit(&self, change: &KvChange) -> bool {
        let admitted = self.own_writes.admit(&change.key);
        if !admitted {
            trace!(key = %change.key, "dropping value superseded by own write");
        }
        admitted
    }

    /// Handles requests forwarded by the replication service.
    pub async fn handle_remote(&self, changes: &[KvChange]) {
        for change in changes {
            trace!(key = %change.key, "loyalty request from replication");
            match change.key.as_str() {
                REMOTE_REDEEM_KEY => self.handle_remote_redeem(change).await,
                REMOTE_CONTRIBUTE_KEY => self.handle_remote_contribution(change).await,
                _ => {}
            }
        }
    }

    async fn handle_remote_redeem(&self, change: &KvChange) {
        let request: RemoteRedeemRequest = match decode(change) {
            Ok(r) => r,
            Err(e) => {
                warn!("error decoding redeem request: {}", e);
                return;
            }
        };

        let reward = self.get_reward(&request.reward_id).await;
        if reward.id.is_empty() {
            warn!(reward_id = %request.reward_id, "redeem request contains invalid reward id");
            return;
        }

        let redeem = Redeem {
            username: request.username,
            display_name: request.display_name,
            when: self.clock.now(),
            reward,
            request_text: request.request_text,
        };
        let result = if self.options.allow_remote_overdraft {
            self.perform_redeem(redeem).await
        } else {
            self.perform_redeem_checked(redeem).await
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_domain() => warn!("redeem request refused: {}", e),
            Err(e) => error!("error performing redeem request: {:?}", e),
        }
    }

    async fn handle_remote_contribution(&self, change: &KvChange) {
        let request: RemoteContributeRequest = match decode(change) {
            Ok(r) => r,
            Err(e) => {
                warn!("error decoding contribution request: {}", e);
                return;
            }
        };

        let goal = self.get_goal(&request.goal_id).await;
        if goal.id.is_empty() {
            warn!(goal_id = %request.goal_id, "contribute request contains invalid goal id");
            return;
        }

        match self.perform_contribution(&goal, &request.username, request.amount).await {
            Ok(_) => {}
            Err(e) if e.is_domain() => warn!("contribution request refused: {}", e),
            Err(e) => error!("error performing contribution request: {:?}", e),
        }
    }
}

/// Runs until the subscription closes or the engine is dropped.
fn spawn_dispatch_loop(engine: Weak<LoyaltyManager>, mut sub: Subscription, remote: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(prefix = %sub.prefix, "dispatcher started");
        while let Some(batch) = sub.receiver.recv().await {
            let Some(engine) = engine.upgrade() else { break };
            if remote {
                engine.handle_remote(&batch).await;
            } else {
                engine.apply_local_changes(&batch).await;
            }
        }
        debug!(prefix = %sub.prefix, "dispatcher stopped");
    })
}
