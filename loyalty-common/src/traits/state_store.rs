// File: loyalty-common/src/traits/state_store.rs

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{ClientId, KvChange, SubscriptionId};
use crate::Error;

/// Standing prefix subscription. Every write to a matching key arrives on
/// `receiver` as a batch, including writes made by the subscriber itself.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub prefix: String,
    pub receiver: mpsc::UnboundedReceiver<Vec<KvChange>>,
}

/// Persistent key-value store with prefix subscriptions.
///
/// Values are opaque strings; an unset key reads as `""`.
#[async_trait]
pub trait StateStore: Send + Sync {
    fn client_id(&self) -> ClientId;

    async fn get_key(&self, key: &str) -> Result<String, Error>;
    async fn put_key(&self, key: &str, data: &str) -> Result<(), Error>;
    async fn put_bulk(&self, kvs: HashMap<String, String>) -> Result<(), Error>;
    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, String>, Error>;

    async fn subscribe_prefix(&self, prefix: &str) -> Result<Subscription, Error>;
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), Error>;
}

/// JSON marshaling on top of any [`StateStore`].
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Fails with [`Error::EmptyKey`] when the key is unset or blank.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<T, Error> {
        let raw = self.get_key(key).await?;
        if raw.is_empty() {
            return Err(Error::EmptyKey(key.to_string()));
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), Error> {
        let encoded = serde_json::to_string(value)?;
        self.put_key(key, &encoded).await
    }

    async fn put_json_bulk<T: Serialize + Sync>(&self, kvs: &HashMap<String, T>) -> Result<(), Error> {
        let mut encoded = HashMap::with_capacity(kvs.len());
        for (k, v) in kvs {
            encoded.insert(k.clone(), serde_json::to_string(v)?);
        }
        self.put_bulk(encoded).await
    }

    /// There is no delete in the store; a removed key is an empty one.
    async fn remove_key(&self, key: &str) -> Result<(), Error> {
        self.put_key(key, "").await
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}
