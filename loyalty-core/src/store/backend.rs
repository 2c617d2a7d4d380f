// File: loyalty-core/src/store/backend.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::Error;

/// Raw storage behind the hub. Only the hub actor talks to it, so
/// implementations never see two writes at once.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn put(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn put_bulk(&self, kvs: &HashMap<String, String>) -> Result<(), Error>;
    async fn scan_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, Error>;
}

/// Non-durable backend for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { data: RwLock::new(data) }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn put_bulk(&self, kvs: &HashMap<String, String>) -> Result<(), Error> {
        let mut data = self.data.write();
        for (k, v) in kvs {
            data.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, Error> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_prefix_stops_at_prefix_boundary() {
        let backend = MemoryBackend::with_entries([
            ("loyalty/points/a", "1"),
            ("loyalty/points/b", "2"),
            ("loyalty/pointsx", "3"),
            ("loyalty/config", "{}"),
        ]);

        let found = backend.scan_prefix("loyalty/points/").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("loyalty/points/b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_missing_key_is_none() {
        let backend = MemoryBackend::new();
        tokio_test::block_on(async {
            assert!(backend.get("nope").await.unwrap().is_none());
            backend.put("nope", "yes").await.unwrap();
            assert_eq!(backend.get("nope").await.unwrap().as_deref(), Some("yes"));
        });
    }
}
