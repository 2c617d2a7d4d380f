// tests/postgres_backend_tests.rs
//
// Runs against the database in TEST_DATABASE_URL; every test returns early
// when it is unset. Keys live under a fresh prefix so runs don't collide.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use loyalty_common::models::PointsEntry;
use loyalty_common::traits::{StateStore, StateStoreExt};
use loyalty_core::store::{KvBackend, KvHub, PostgresBackend};
use loyalty_core::test_utils::helpers::test_database;
use loyalty_core::Error;

fn scratch_prefix() -> String {
    format!("test/{}/", Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_get_and_put_upsert() -> Result<(), Error> {
    let Some(db) = test_database().await else { return Ok(()) };
    let backend = PostgresBackend::from_database(&db);
    let key = format!("{}config", scratch_prefix());

    assert_eq!(backend.get(&key).await?, None);
    backend.put(&key, "one").await?;
    backend.put(&key, "two").await?;
    assert_eq!(backend.get(&key).await?.as_deref(), Some("two"));

    // Blank values are stored, not deleted.
    backend.put(&key, "").await?;
    assert_eq!(backend.get(&key).await?.as_deref(), Some(""));
    Ok(())
}

#[tokio::test]
async fn test_put_bulk_writes_every_key() -> Result<(), Error> {
    let Some(db) = test_database().await else { return Ok(()) };
    let backend = PostgresBackend::from_database(&db);
    let prefix = scratch_prefix();

    let kvs: HashMap<String, String> = (0..4)
        .map(|i| (format!("{prefix}points/user{i}"), format!(r#"{{"points":{i}}}"#)))
        .collect();
    backend.put_bulk(&kvs).await?;

    assert_eq!(backend.scan_prefix(&prefix).await?, kvs);
    Ok(())
}

#[tokio::test]
async fn test_prefix_scan_treats_wildcards_literally() -> Result<(), Error> {
    let Some(db) = test_database().await else { return Ok(()) };
    let backend = PostgresBackend::from_database(&db);
    let base = scratch_prefix();

    backend.put(&format!("{base}a_b/1"), "underscore").await?;
    backend.put(&format!("{base}axb/1"), "x").await?;
    backend.put(&format!("{base}100%/1"), "percent").await?;
    backend.put(&format!("{base}1000/1"), "digits").await?;

    let underscored = backend.scan_prefix(&format!("{base}a_b/")).await?;
    assert_eq!(underscored.len(), 1);
    assert_eq!(underscored.values().next().map(String::as_str), Some("underscore"));

    let percent = backend.scan_prefix(&format!("{base}100%")).await?;
    assert_eq!(percent.len(), 1);
    assert_eq!(percent.values().next().map(String::as_str), Some("percent"));

    assert_eq!(backend.scan_prefix(&base).await?.len(), 4);
    assert!(backend.scan_prefix(&format!("{base}zzz")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_hub_over_postgres_persists_and_notifies() -> Result<(), Error> {
    let Some(db) = test_database().await else { return Ok(()) };
    let hub = KvHub::spawn(Arc::new(PostgresBackend::from_database(&db)));
    let writer = hub.connect();
    let reader = hub.connect();
    let prefix = scratch_prefix();
    let key = format!("{prefix}points/kitty");

    let mut sub = reader.subscribe_prefix(&prefix).await?;
    writer.put_json(&key, &PointsEntry { points: 12 }).await?;

    let batch = sub.receiver.recv().await.expect("notification");
    assert_eq!(batch[0].key, key);
    assert_eq!(batch[0].origin, writer.client_id());

    hub.join().await;
    let fresh = KvHub::spawn(Arc::new(PostgresBackend::from_database(&db)));
    let entry: PointsEntry = fresh.connect().get_json(&key).await?;
    assert_eq!(entry.points, 12);
    Ok(())
}
