// tests/loyalty_flow_tests.rs
//
// End-to-end flows through the hub: other clients write keys, the engine's
// dispatchers pick them up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use tokio::sync::mpsc;

use loyalty_common::keys::{
    points_key, CONFIG_KEY, CREATE_REDEEM_RPC, GOALS_KEY, LEGACY_POINTS_KEY, POINTS_PREFIX, QUEUE_KEY, REMOTE_CONTRIBUTE_KEY,
    REMOTE_REDEEM_KEY, REMOVE_REDEEM_RPC, REPLICATED_KEYS, REWARDS_KEY,
};
use loyalty_common::models::{
    Goal, LoyaltyConfig, PointsEntry, Redeem, RemoteContributeRequest, RemoteRedeemRequest, Reward,
};
use loyalty_common::traits::{KeyReplicator, StateStore, StateStoreExt};
use loyalty_core::store::{KvHub, MemoryBackend};
use loyalty_core::test_utils::helpers::{reward, wait_until, TestEnv};
use loyalty_core::{Error, LoyaltyManager, LoyaltyOptions, ModuleRegistry};

mock! {
    Replicator {}
    #[async_trait]
    impl KeyReplicator for Replicator {
        async fn replicate_keys(&self, keys: Vec<String>) -> Result<(), Error>;
    }
}

#[tokio::test]
async fn test_foreign_snapshots_reach_the_mirror() -> Result<(), Error> {
    let env = TestEnv::new().await;
    let engine = env.start_default().await;
    let admin = env.other_client();

    admin
        .put_json(CONFIG_KEY, &LoyaltyConfig { enabled: true, currency: "maows".into(), ..Default::default() })
        .await?;
    admin.put_json(REWARDS_KEY, &vec![reward("hug", 10, 0)]).await?;
    admin.put_json(&points_key("kitty"), &PointsEntry { points: 75 }).await?;

    assert!(wait_until(|| async { engine.config().await.currency == "maows" }).await);
    assert!(wait_until(|| async { engine.get_reward("hug").await.price == 10 }).await);
    assert!(wait_until(|| async { engine.get_points("kitty").await == 75 }).await);
    assert!(engine.status().await.enabled);
    Ok(())
}

#[tokio::test]
async fn test_engine_writes_are_visible_to_other_clients() -> Result<(), Error> {
    let env = TestEnv::new().await;
    env.seed_rewards(&[reward("hug", 10, 0)]).await;
    env.seed_points("kitty", 30).await;
    let engine = env.start_default().await;
    let observer = env.other_client();
    let mut sub = observer.subscribe_prefix(QUEUE_KEY).await?;

    let redeem = Redeem {
        username: "kitty".into(),
        display_name: "Kitty".into(),
        when: engine.now(),
        reward: engine.get_reward("hug").await,
        request_text: String::new(),
    };
    engine.perform_redeem(redeem).await?;

    let batch = sub.receiver.recv().await.expect("queue notification");
    assert_eq!(batch[0].key, QUEUE_KEY);
    let queue: Vec<Redeem> = serde_json::from_str(&batch[0].data)?;
    assert_eq!(queue.len(), 1);

    let entry: PointsEntry = observer.get_json(&points_key("kitty")).await?;
    assert_eq!(entry.points, 20);
    Ok(())
}

#[tokio::test]
async fn test_rpc_keys_written_by_another_client() -> Result<(), Error> {
    let env = TestEnv::new().await;
    let engine = env.start_default().await;
    let admin = env.other_client();

    let redeem = Redeem {
        username: "bun".into(),
        display_name: "Bun".into(),
        when: engine.now(),
        reward: reward("song", 0, 0),
        request_text: "lofi".into(),
    };
    admin.put_json(CREATE_REDEEM_RPC, &redeem).await?;
    assert!(wait_until(|| async { engine.queue().await.len() == 1 }).await);

    admin.put_json(REMOVE_REDEEM_RPC, &redeem).await?;
    assert!(wait_until(|| async { engine.queue().await.is_empty() }).await);

    let stored: Vec<Redeem> = admin.get_json(QUEUE_KEY).await?;
    assert!(stored.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_remote_requests_flow_through_the_namespace() -> Result<(), Error> {
    let env = TestEnv::new().await;
    env.seed_rewards(&[reward("hug", 10, 0)]).await;
    env.seed_goals(&[Goal {
        id: "mic".into(),
        name: "Mic".into(),
        total_goal: 100,
        enabled: true,
        ..Default::default()
    }])
    .await;
    env.seed_points("kitty", 60).await;
    let engine = env.start_default().await;
    let remote = env.other_client();

    let redeem = RemoteRedeemRequest {
        username: "kitty".into(),
        display_name: "Kitty".into(),
        reward_id: "hug".into(),
        request_text: String::new(),
    };
    remote.put_json(REMOTE_REDEEM_KEY, &redeem).await?;
    assert!(wait_until(|| async { engine.get_points("kitty").await == 50 }).await);
    assert_eq!(engine.queue().await.len(), 1);

    let contribute = RemoteContributeRequest { goal_id: "mic".into(), username: "kitty".into(), amount: 30 };
    remote.put_json(REMOTE_CONTRIBUTE_KEY, &contribute).await?;
    assert!(wait_until(|| async { engine.get_goal("mic").await.contributed == 30 }).await);
    assert_eq!(engine.get_points("kitty").await, 20);

    let goals: Vec<Goal> = remote.get_json(GOALS_KEY).await?;
    assert_eq!(goals[0].contributors.get("kitty"), Some(&30));
    Ok(())
}

#[tokio::test]
async fn test_remote_dispatcher_survives_oversized_cooldown() -> Result<(), Error> {
    let env = TestEnv::new().await;
    env.seed_rewards(&[reward("forever", 1, i64::MAX / 2), reward("hug", 1, 0)]).await;
    let engine = env.start_default().await;
    let remote = env.other_client();

    for reward_id in ["forever", "hug"] {
        let request = RemoteRedeemRequest {
            username: "kitty".into(),
            display_name: "Kitty".into(),
            reward_id: reward_id.into(),
            request_text: String::new(),
        };
        remote.put_json(REMOTE_REDEEM_KEY, &request).await?;
    }

    assert!(wait_until(|| async { engine.queue().await.len() == 2 }).await);
    assert!(engine.get_reward_cooldown("forever").await > engine.now());
    assert_eq!(engine.get_points("kitty").await, -2);
    Ok(())
}

#[tokio::test]
async fn test_legacy_points_are_migrated_on_start() -> Result<(), Error> {
    let env = TestEnv::new().await;
    let legacy: HashMap<String, i64> = HashMap::from([("kitty".to_string(), 5), ("bun".to_string(), 9)]);
    env.store.put_json(LEGACY_POINTS_KEY, &legacy).await?;

    let engine = env.start_default().await;
    assert_eq!(engine.get_points("kitty").await, 5);
    assert_eq!(engine.get_points("bun").await, 9);

    let stored = env.store.get_all(POINTS_PREFIX).await?;
    assert_eq!(stored.len(), 2);
    assert!(env.store.get_key(LEGACY_POINTS_KEY).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_replicator_receives_loyalty_keys() -> Result<(), Error> {
    let hub = KvHub::spawn(Arc::new(MemoryBackend::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut replicator = MockReplicator::new();
    replicator.expect_replicate_keys().times(1).returning(move |keys| {
        let _ = tx.send(keys);
        Ok(())
    });

    let registry = ModuleRegistry::builder()
        .with_store(Arc::new(hub.connect()))
        .with_replicator(Arc::new(replicator))
        .build()?;
    let _engine = LoyaltyManager::start(&registry, LoyaltyOptions::default()).await?;

    let keys = rx.recv().await.expect("replicate_keys called");
    let expected: Vec<String> = REPLICATED_KEYS.iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, expected);
    Ok(())
}

#[tokio::test]
async fn test_close_stops_following_the_store() -> Result<(), Error> {
    let env = TestEnv::new().await;
    let engine = env.start_default().await;
    engine.close().await?;

    let admin = env.other_client();
    admin.put_json(&points_key("late"), &PointsEntry { points: 1 }).await?;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(engine.get_points("late").await, 0);
    Ok(())
}

#[tokio::test]
async fn test_state_survives_engine_restart() -> Result<(), Error> {
    let env = TestEnv::new().await;
    env.seed_rewards(&[Reward { id: "hug".into(), name: "Hug".into(), price: 5, enabled: true, ..Default::default() }])
        .await;
    env.seed_points("kitty", 10).await;

    let first = env.start_default().await;
    let redeem = Redeem {
        username: "kitty".into(),
        display_name: "Kitty".into(),
        when: first.now(),
        reward: first.get_reward("hug").await,
        request_text: String::new(),
    };
    first.perform_redeem(redeem).await?;
    first.close().await?;

    let second = env.start_default().await;
    assert_eq!(second.get_points("kitty").await, 5);
    assert_eq!(second.queue().await.len(), 1);
    Ok(())
}
