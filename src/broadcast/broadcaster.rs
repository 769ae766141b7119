use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::protocol::ServerEvent;
use crate::store::StateStore;
use crate::supervisor::ProcessStatus;
use crate::telemetry::{ObservablesSnapshot, PvtFix};

/// A serialized event, shared by every client queue it is pushed to.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        ClientId(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, enough to tell sessions apart in logs.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// The receiving half of a registration. Frames arrive in publish order;
/// the stream ends once the client is unregistered.
pub struct Subscription {
    pub id: ClientId,
    pub frames: mpsc::Receiver<Frame>,
}

/// Extra queue room for the catch-up frames sent on registration.
const CATCH_UP_FRAMES: usize = 2;

struct Client {
    tx: mpsc::Sender<Frame>,
    /// What the catch-up frames carried, until the first live event of the
    /// same kind. A worker may have stored an update but not yet published
    /// it when the client registered; that update is not sent twice.
    sent_pvt: Option<Arc<PvtFix>>,
    sent_observables: Vec<Arc<ObservablesSnapshot>>,
}

impl Client {
    fn pvt_already_sent(&mut self, fix: &Arc<PvtFix>) -> bool {
        self.sent_pvt
            .take()
            .is_some_and(|sent| Arc::ptr_eq(&sent, fix))
    }

    fn observables_already_sent(&mut self, snapshot: &Arc<ObservablesSnapshot>) -> bool {
        let sent = self
            .sent_observables
            .iter()
            .any(|held| Arc::ptr_eq(held, snapshot));
        self.sent_observables.clear();
        sent
    }
}

/// Fans telemetry out to every connected client.
///
/// Publishing never waits on a client: each one has a bounded queue, and a
/// client whose queue is full (or whose receiver is gone) is dropped.
pub struct Broadcaster {
    store: Arc<StateStore>,
    backlog: usize,
    catch_up_limit: usize,
    clients: StdMutex<HashMap<ClientId, Client>>,
    published: AtomicU64,
    evicted: AtomicU64,
}

impl Broadcaster {
    pub fn new(store: Arc<StateStore>, backlog: usize, catch_up_limit: usize) -> Self {
        Self {
            store,
            backlog: backlog.max(1),
            catch_up_limit,
            clients: StdMutex::new(HashMap::new()),
            published: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Adds a client. The latest fix and the recent observables are queued
    /// ahead of any live event.
    pub fn register(&self) -> Subscription {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.backlog + CATCH_UP_FRAMES);

        // Read the store with the client map locked: an update that lands
        // after this read is published to the new client too.
        let mut clients = self.clients.lock().unwrap();
        let pvt = self.store.latest_pvt();
        let snapshots = self.store.recent_observables(self.catch_up_limit);
        let catch_up = [
            ServerEvent::Pvt { pvt: pvt.clone() },
            ServerEvent::Observables {
                snapshots: snapshots.clone(),
                meta: self.store.observables_meta(),
            },
        ];
        for event in &catch_up {
            if let Some(frame) = serialize(event) {
                // Fresh queue with reserved room, cannot be full.
                let _ = tx.try_send(frame);
            }
        }
        clients.insert(
            id,
            Client {
                tx,
                sent_pvt: pvt,
                sent_observables: snapshots,
            },
        );
        log::info!("Client {} registered ({} connected)", id, clients.len());

        Subscription { id, frames: rx }
    }

    /// Returns false if the client was already gone.
    pub fn unregister(&self, id: &ClientId) -> bool {
        let mut clients = self.clients.lock().unwrap();
        let removed = clients.remove(id).is_some();
        if removed {
            log::info!("Client {} unregistered ({} connected)", id, clients.len());
        }
        removed
    }

    pub fn publish_pvt(&self, fix: Arc<PvtFix>) {
        let event = ServerEvent::Pvt {
            pvt: Some(fix.clone()),
        };
        self.publish(&event, |client| client.pvt_already_sent(&fix));
    }

    pub fn publish_observables(&self, snapshot: Arc<ObservablesSnapshot>) {
        let event = ServerEvent::Observables {
            snapshots: vec![snapshot.clone()],
            meta: self.store.observables_meta(),
        };
        self.publish(&event, |client| client.observables_already_sent(&snapshot));
    }

    pub fn publish_status(&self, status: ProcessStatus) {
        self.publish(&ServerEvent::Status { status }, |_| false);
    }

    /// Forwards every supervisor status change until the sender is dropped.
    pub fn follow_status(
        self: &Arc<Self>,
        mut updates: watch::Receiver<ProcessStatus>,
    ) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let status = updates.borrow_and_update().clone();
                broadcaster.publish_status(status);
            }
        })
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Sends `event` to every client for which `skip` returns false.
    fn publish<F>(&self, event: &ServerEvent, mut skip: F)
    where
        F: FnMut(&mut Client) -> bool,
    {
        let Some(frame) = serialize(event) else {
            return;
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.clients.lock().unwrap();
        clients.retain(|id, client| {
            if skip(client) {
                return true;
            }
            match client.tx.try_send(frame.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Client {} fell {} frames behind, dropping it",
                        id,
                        self.backlog
                    );
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    log::debug!("Client {} went away", id);
                    false
                }
            }
        });
    }
}

fn serialize(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            log::error!("Failed to serialize {} event: {}", event.kind(), e);
            None
        }
    }
}
