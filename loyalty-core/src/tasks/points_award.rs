//! src/tasks/points_award.rs
//!
//! Periodically hands out points to everyone in chat while the stream is live.
//! Chatters that spoke since the previous award get the activity bonus on top.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use loyalty_common::traits::ChatPresence;

use crate::loyalty::LoyaltyManager;
use crate::Error;

/// How long to wait before looking at the config again while awards are off.
const IDLE_RECHECK: Duration = Duration::from_secs(30);

/// Users that chatted since the last award.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    active: DashSet<String>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_active(&self, user: &str) {
        self.active.insert(user.to_lowercase());
    }

    pub fn is_active(&self, user: &str) -> bool {
        self.active.contains(&user.to_lowercase())
    }

    pub fn reset(&self) {
        self.active.clear();
    }
}

/// Runs one award round and returns how many chatters were credited.
///
/// If the stream status can't be fetched the stream is assumed online.
pub async fn award_points_once(
    engine: &LoyaltyManager,
    presence: &dyn ChatPresence,
    activity: &ActivityTracker,
) -> Result<usize, Error> {
    let online = match presence.is_stream_online().await {
        Ok(online) => online,
        Err(e) => {
            error!("Error checking stream status: {:?}", e);
            true
        }
    };
    if !online {
        debug!("points award skipped: stream is offline");
        return Ok(0);
    }

    let chatters = presence.list_chatters().await?;
    let config = engine.config().await;

    let mut batch = HashMap::new();
    for user in chatters {
        if config.is_banned(&user) {
            continue;
        }
        let mut award = config.points.amount;
        if activity.is_active(&user) {
            award += config.points.activity_bonus;
        }
        batch.insert(user, award);
    }
    activity.reset();

    if batch.is_empty() {
        return Ok(0);
    }
    engine.give_points(&batch).await?;
    debug!(users = batch.len(), "awarded points");
    Ok(batch.len())
}

/// Spawns the award loop. The config is re-read before every round so interval
/// and amount changes apply without a restart.
pub fn spawn_points_award_task(
    engine: Arc<LoyaltyManager>,
    presence: Arc<dyn ChatPresence>,
    activity: Arc<ActivityTracker>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("points award task started");
        loop {
            let config = engine.config().await;
            let awarding = config.enabled && config.points.interval > 0;
            let wait = if awarding {
                Duration::from_secs(config.points.interval.unsigned_abs())
            } else {
                IDLE_RECHECK
            };

            tokio::select! {
                biased;
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("points award task shutting down");
                        break;
                    }
                },
                _ = sleep(wait) => {
                    if !awarding {
                        continue;
                    }
                    if let Err(e) = award_points_once(&engine, presence.as_ref(), &activity).await {
                        error!("points award round failed: {:?}", e);
                    }
                }
            }
        }
        info!("points award task exited");
    })
}
