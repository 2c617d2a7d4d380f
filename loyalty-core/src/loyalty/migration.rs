// File: loyalty-core/src/loyalty/migration.rs

use std::collections::HashMap;

use tracing::info;

use loyalty_common::keys::{points_key, LEGACY_POINTS_KEY};
use loyalty_common::models::PointsEntry;
use loyalty_common::traits::{StateStore, StateStoreExt};

use crate::Error;

/// Moves balances from the old single-map key to one key per user, then
/// blanks the old key. Returns `false` when there was nothing to migrate.
pub async fn migrate_points(store: &dyn StateStore) -> Result<bool, Error> {
    let legacy: HashMap<String, i64> = match store.get_json(LEGACY_POINTS_KEY).await {
        Ok(map) => map,
        Err(Error::EmptyKey(_)) => return Ok(false),
        Err(e) => return Err(e),
    };

    let entries: HashMap<String, PointsEntry> = legacy
        .into_iter()
        .map(|(user, points)| (points_key(&user), PointsEntry { points }))
        .collect();

    if !entries.is_empty() {
        store.put_json_bulk(&entries).await?;
    }
    info!(users = entries.len(), "Migrated to new loyalty point format");

    store.remove_key(LEGACY_POINTS_KEY).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::store::{KvHub, MemoryBackend};

    #[tokio::test]
    async fn test_migrates_and_blanks_legacy_key() {
        let backend = MemoryBackend::with_entries([(LEGACY_POINTS_KEY, r#"{"kitty":120,"maow":5}"#)]);
        let hub = KvHub::spawn(Arc::new(backend));
        let client = hub.connect();

        assert!(migrate_points(&client).await.unwrap());

        let kitty: PointsEntry = client.get_json(&points_key("kitty")).await.unwrap();
        assert_eq!(kitty.points, 120);
        assert_eq!(client.get_key(LEGACY_POINTS_KEY).await.unwrap(), "");

        // Second run finds an empty key and does nothing.
        assert!(!migrate_points(&client).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_legacy_key_is_an_error() {
        let backend = MemoryBackend::with_entries([(LEGACY_POINTS_KEY, "not json")]);
        let hub = KvHub::spawn(Arc::new(backend));
        let client = hub.connect();

        assert!(matches!(migrate_points(&client).await, Err(Error::Json(_))));
    }
}
