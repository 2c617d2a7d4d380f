// File: loyalty-core/src/store/client.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use loyalty_common::models::{ClientId, SubscriptionId};
use loyalty_common::traits::{StateStore, Subscription};

use crate::store::hub::{ClientTable, HubCommand, HubReply, HubRequest, HubResponse};
use crate::Error;

type PendingTable = Arc<DashMap<Uuid, oneshot::Sender<HubResponse>>>;

/// In-process connection to a [`KvHub`](crate::store::KvHub).
///
/// Every call is a request/response round trip: the call blocks until the hub
/// acknowledges it. There is no timeout.
pub struct LocalClient {
    id: ClientId,
    requests: mpsc::Sender<HubRequest>,
    clients: ClientTable,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl LocalClient {
    pub(crate) fn new(
        id: ClientId,
        requests: mpsc::Sender<HubRequest>,
        clients: ClientTable,
        mut replies: mpsc::UnboundedReceiver<HubReply>,
    ) -> Self {
        let pending: PendingTable = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let routes = pending.clone();
        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            while let Some(reply) = replies.recv().await {
                match routes.remove(&reply.request_id) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(reply.response);
                    }
                    None => warn!(request = %reply.request_id, "reply for unknown request; ignoring"),
                }
            }
            // The hub is gone: no reply will ever come for what is still pending.
            reader_closed.store(true, Ordering::SeqCst);
            routes.clear();
            debug!("kv client reply channel closed");
        });

        Self { id, requests, clients, pending, closed, reader }
    }

    async fn make_request(&self, command: HubCommand) -> Result<HubResponse, Error> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);

        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&request_id);
            return Err(Error::StoreClosed);
        }

        let req = HubRequest { request_id, client_id: self.id, command };
        if let Err(e) = self.requests.send(req).await {
            self.pending.remove(&request_id);
            return Err(e.into());
        }

        match rx.await {
            Ok(HubResponse::Error { error, details }) => Err(Error::Kv { error, details }),
            Ok(resp) => Ok(resp),
            Err(_) if self.closed.load(Ordering::SeqCst) => Err(Error::StoreClosed),
            // Waiter dropped without a matching reply.
            Err(_) => Err(Error::Unknown),
        }
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.clients.remove(&self.id);
        self.reader.abort();
    }
}

fn expect_ack(resp: HubResponse) -> Result<(), Error> {
    match resp {
        HubResponse::Ack => Ok(()),
        _ => Err(Error::Unknown),
    }
}

fn expect_value(resp: HubResponse) -> Result<String, Error> {
    match resp {
        HubResponse::Value(v) => Ok(v),
        _ => Err(Error::Unknown),
    }
}

fn expect_values(resp: HubResponse) -> Result<HashMap<String, String>, Error> {
    match resp {
        HubResponse::Values(v) => Ok(v),
        _ => Err(Error::Unknown),
    }
}

fn expect_subscribed(resp: HubResponse) -> Result<SubscriptionId, Error> {
    match resp {
        HubResponse::Subscribed(id) => Ok(id),
        _ => Err(Error::Unknown),
    }
}

#[async_trait]
impl StateStore for LocalClient {
    fn client_id(&self) -> ClientId {
        self.id
    }

    async fn get_key(&self, key: &str) -> Result<String, Error> {
        let resp = self.make_request(HubCommand::ReadKey { key: key.to_string() }).await?;
        expect_value(resp)
    }

    async fn put_key(&self, key: &str, data: &str) -> Result<(), Error> {
        let resp = self
            .make_request(HubCommand::WriteKey {
                key: key.to_string(),
                data: data.to_string(),
            })
            .await?;
        expect_ack(resp)
    }

    async fn put_bulk(&self, kvs: HashMap<String, String>) -> Result<(), Error> {
        let resp = self.make_request(HubCommand::WriteBulk { kvs }).await?;
        expect_ack(resp)
    }

    async fn get_all(&self, prefix: &str) -> Result<HashMap<String, String>, Error> {
        let resp = self
            .make_request(HubCommand::ReadPrefix { prefix: prefix.to_string() })
            .await?;
        expect_values(resp)
    }

    async fn subscribe_prefix(&self, prefix: &str) -> Result<Subscription, Error> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let resp = self
            .make_request(HubCommand::SubscribePrefix {
                prefix: prefix.to_string(),
                sender,
            })
            .await?;
        let id = expect_subscribed(resp)?;
        Ok(Subscription {
            id,
            prefix: prefix.to_string(),
            receiver,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), Error> {
        let resp = self.make_request(HubCommand::Unsubscribe { id }).await?;
        expect_ack(resp)
    }
}
