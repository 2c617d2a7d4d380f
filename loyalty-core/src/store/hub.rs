//! src/store/hub.rs
//!
//! The hub is a single actor task: requests arrive over one MPSC queue and are
//! executed strictly in order, so every client observes the same write order.
//! Replies travel back on a per-client channel tagged with the request id.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use loyalty_common::models::{ClientId, KvChange, SubscriptionId};

use crate::store::backend::KvBackend;
use crate::store::client::LocalClient;
use crate::Error;

/// Default depth of the request queue. Callers wait (backpressure) when full.
const DEFAULT_REQUEST_BUFFER: usize = 1024;

#[derive(Debug)]
pub(crate) enum HubCommand {
    ReadKey { key: String },
    WriteKey { key: String, data: String },
    WriteBulk { kvs: HashMap<String, String> },
    ReadPrefix { prefix: String },
    SubscribePrefix {
        prefix: String,
        sender: mpsc::UnboundedSender<Vec<KvChange>>,
    },
    Unsubscribe { id: SubscriptionId },
}

#[derive(Debug)]
pub(crate) struct HubRequest {
    pub request_id: Uuid,
    pub client_id: ClientId,
    pub command: HubCommand,
}

/// Outcome of one request, as sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubResponse {
    Ack,
    Value(String),
    Values(HashMap<String, String>),
    Subscribed(SubscriptionId),
    Error { error: String, details: String },
}

#[derive(Debug)]
pub(crate) struct HubReply {
    pub request_id: Uuid,
    pub response: HubResponse,
}

pub(crate) type ClientTable = Arc<DashMap<ClientId, mpsc::UnboundedSender<HubReply>>>;

struct Subscriber {
    prefix: String,
    client_id: ClientId,
    sender: mpsc::UnboundedSender<Vec<KvChange>>,
}

/// Handle to a running hub. Cloning shares the same actor.
#[derive(Clone)]
pub struct KvHub {
    requests: mpsc::Sender<HubRequest>,
    clients: ClientTable,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl KvHub {
    /// Spawns the hub actor on the current tokio runtime.
    pub fn spawn(backend: Arc<dyn KvBackend>) -> Self {
        Self::spawn_with_buffer(backend, DEFAULT_REQUEST_BUFFER)
    }

    pub fn spawn_with_buffer(backend: Arc<dyn KvBackend>, buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let clients: ClientTable = Arc::new(DashMap::new());

        let actor = HubActor {
            backend,
            clients: clients.clone(),
            subscribers: HashMap::new(),
        };
        let task = tokio::spawn(actor.run(rx, shutdown_rx));

        Self {
            requests: tx,
            clients,
            shutdown_tx: Arc::new(shutdown_tx),
            task: Arc::new(parking_lot::Mutex::new(Some(task))),
        }
    }

    /// Registers a new client. Each client gets its own id, which is stamped as
    /// `origin` on every change it writes.
    pub fn connect(&self) -> LocalClient {
        let client_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        self.clients.insert(client_id, reply_tx);
        debug!(client = %client_id, "kv client connected");
        LocalClient::new(client_id, self.requests.clone(), self.clients.clone(), reply_rx)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signals shutdown and waits for the actor to finish the request it is on.
    pub async fn join(&self) {
        self.shutdown();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

struct HubActor {
    backend: Arc<dyn KvBackend>,
    clients: ClientTable,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl HubActor {
    async fn run(mut self, mut rx: mpsc::Receiver<HubRequest>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("kv hub started");
        loop {
            tokio::select! {
                biased;
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("kv hub shutting down => break from loop.");
                        break;
                    }
                },
                maybe_req = rx.recv() => {
                    match maybe_req {
                        Some(req) => self.handle(req).await,
                        None => {
                            info!("kv hub request channel closed => break from loop.");
                            break;
                        }
                    }
                }
            }
        }
        // Requests still queued are dropped with the receiver. Closing the
        // reply channels afterwards lets every client fail its waiters.
        drop(rx);
        self.clients.clear();
        // Dropping the senders closes every subscription stream.
        self.subscribers.clear();
        info!("kv hub exited");
    }

    async fn handle(&mut self, req: HubRequest) {
        let HubRequest { request_id, client_id, command } = req;
        let response = match self.execute(client_id, command).await {
            Ok(r) => r,
            Err(e) => HubResponse::Error {
                error: "backend error".to_string(),
                details: e.to_string(),
            },
        };

        match self.clients.get(&client_id) {
            Some(reply_tx) => {
                if reply_tx.send(HubReply { request_id, response }).is_err() {
                    debug!(client = %client_id, "client reply channel closed");
                }
            }
            None => debug!(client = %client_id, "dropping reply for disconnected client"),
        }
    }

    async fn execute(&mut self, client_id: ClientId, command: HubCommand) -> Result<HubResponse, Error> {
        match command {
            HubCommand::ReadKey { key } => {
                let value = self.backend.get(&key).await?;
                Ok(HubResponse::Value(value.unwrap_or_default()))
            }
            HubCommand::WriteKey { key, data } => {
                self.backend.put(&key, &data).await?;
                self.notify(client_id, vec![(key, data)]);
                Ok(HubResponse::Ack)
            }
            HubCommand::WriteBulk { kvs } => {
                self.backend.put_bulk(&kvs).await?;
                self.notify(client_id, kvs.into_iter().collect());
                Ok(HubResponse::Ack)
            }
            HubCommand::ReadPrefix { prefix } => {
                let values = self.backend.scan_prefix(&prefix).await?;
                Ok(HubResponse::Values(values))
            }
            HubCommand::SubscribePrefix { prefix, sender } => {
                let id = Uuid::new_v4();
                debug!(client = %client_id, prefix = %prefix, "prefix subscription added");
                self.subscribers.insert(id, Subscriber { prefix, client_id, sender });
                Ok(HubResponse::Subscribed(id))
            }
            HubCommand::Unsubscribe { id } => match self.subscribers.remove(&id) {
                Some(_) => Ok(HubResponse::Ack),
                None => Ok(HubResponse::Error {
                    error: "subscription not found".to_string(),
                    details: id.to_string(),
                }),
            },
        }
    }

    /// Delivers one batch per subscriber holding every matching change.
    fn notify(&mut self, origin: ClientId, changes: Vec<(String, String)>) {
        self.subscribers.retain(|id, sub| {
            let batch: Vec<KvChange> = changes
                .iter()
                .filter(|(k, _)| k.starts_with(&sub.prefix))
                .map(|(k, v)| KvChange {
                    key: k.clone(),
                    data: v.clone(),
                    origin,
                })
                .collect();
            if batch.is_empty() {
                return true;
            }
            if sub.sender.send(batch).is_err() {
                warn!(subscription = %id, client = %sub.client_id, "subscriber went away; dropping subscription");
                return false;
            }
            true
        });
    }
}
