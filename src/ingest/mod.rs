//! UDP ingestion of the receiver's monitoring streams.
//!
//! One worker per stream, each owning its socket:
//!
//! ```text
//! PVT port ─────────► decode_pvt ─────────► StateStore::set_latest_pvt ────► Broadcaster::publish_pvt
//! Observables port ─► decode_observables ─► StateStore::append_observables ─► Broadcaster::publish_observables
//! ```
//!
//! A datagram that fails to decode is logged and dropped. Socket errors that
//! are not transient end the worker, and so does a panic; either way its
//! [`StreamStats`] then report it dead.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::broadcast::Broadcaster;
use crate::config::TelemetryConfig;
use crate::store::StateStore;
use crate::telemetry::{decode_observables, decode_pvt, DecodeError, WireLayout};

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to bind {stream} socket on {addr}: {source}")]
    Bind {
        stream: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Counters for one stream, shared between its worker and the health API.
#[derive(Debug)]
pub struct StreamStats {
    name: &'static str,
    local_addr: SocketAddr,
    alive: AtomicBool,
    received: AtomicU64,
    accepted: AtomicU64,
    decode_errors: AtomicU64,
    last_error: StdMutex<Option<String>>,
    last_datagram: StdMutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StreamHealth {
    pub stream: String,
    pub local_addr: String,
    pub alive: bool,
    pub received: u64,
    pub accepted: u64,
    pub decode_errors: u64,
    pub last_error: Option<String>,
    pub last_datagram: Option<DateTime<Utc>>,
}

impl StreamStats {
    fn new(name: &'static str, local_addr: SocketAddr) -> Self {
        StreamStats {
            name,
            local_addr,
            alive: AtomicBool::new(true),
            received: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            last_error: StdMutex::new(None),
            last_datagram: StdMutex::new(None),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn snapshot(&self) -> StreamHealth {
        StreamHealth {
            stream: self.name.to_string(),
            local_addr: self.local_addr.to_string(),
            alive: self.is_alive(),
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            last_error: self.last_error.lock().unwrap().clone(),
            last_datagram: *self.last_datagram.lock().unwrap(),
        }
    }

    fn record_datagram(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *self.last_datagram.lock().unwrap() = Some(Utc::now());
    }

    fn record_error(&self, err: &DecodeError) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap() = Some(err.to_string());
    }
}

/// Marks the stream dead when its worker ends for any reason, unwinding
/// included.
struct AliveGuard(Arc<StreamStats>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        let stats = &self.0;
        stats.alive.store(false, Ordering::Relaxed);
        if std::thread::panicking() {
            log::error!("{} worker panicked", stats.name);
            // Must not panic again while unwinding.
            if let Ok(mut last_error) = stats.last_error.lock() {
                *last_error = Some("worker panicked".to_string());
            }
        }
    }
}

/// Bound but not yet running sockets.
pub struct UdpReceivers {
    pvt: UdpSocket,
    observables: UdpSocket,
    layout: WireLayout,
}

/// Running workers.
pub struct Ingestion {
    pub pvt: Arc<StreamStats>,
    pub observables: Arc<StreamStats>,
    handles: Vec<JoinHandle<()>>,
}

impl Ingestion {
    pub fn streams(&self) -> [Arc<StreamStats>; 2] {
        [self.pvt.clone(), self.observables.clone()]
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

impl UdpReceivers {
    pub async fn bind(config: &TelemetryConfig) -> Result<Self, IngestError> {
        let pvt = bind("pvt", config.pvt_addr()).await?;
        let observables = bind("observables", config.observables_addr()).await?;
        Ok(UdpReceivers {
            pvt,
            observables,
            layout: config.layout,
        })
    }

    pub fn spawn(self, store: Arc<StateStore>, broadcaster: Arc<Broadcaster>) -> io::Result<Ingestion> {
        let layout = self.layout;
        let pvt_stats = Arc::new(StreamStats::new("pvt", self.pvt.local_addr()?));
        let obs_stats = Arc::new(StreamStats::new(
            "observables",
            self.observables.local_addr()?,
        ));

        let pvt_worker = {
            let store = store.clone();
            let broadcaster = broadcaster.clone();
            tokio::spawn(run_worker(self.pvt, pvt_stats.clone(), move |buf| {
                let fix = decode_pvt(buf, &layout)?;
                let fix = store.set_latest_pvt(fix);
                broadcaster.publish_pvt(fix);
                Ok(true)
            }))
        };

        let obs_worker = tokio::spawn(run_worker(
            self.observables,
            obs_stats.clone(),
            move |buf| {
                let snapshot = decode_observables(buf, &layout)?;
                let (outcome, snapshot) = store.append_observables(snapshot);
                if !outcome.stored() {
                    log::debug!(
                        "Observables snapshot {} not stored: {:?}",
                        snapshot.sequence,
                        outcome
                    );
                    return Ok(false);
                }
                broadcaster.publish_observables(snapshot);
                Ok(true)
            },
        ));

        Ok(Ingestion {
            pvt: pvt_stats,
            observables: obs_stats,
            handles: vec![pvt_worker, obs_worker],
        })
    }
}

async fn bind(stream: &'static str, addr: String) -> Result<UdpSocket, IngestError> {
    let socket = UdpSocket::bind(&addr)
        .await
        .map_err(|source| IngestError::Bind {
            stream,
            addr: addr.clone(),
            source,
        })?;
    log::info!("Listening for {} datagrams on {}", stream, addr);
    Ok(socket)
}

async fn run_worker<H>(socket: UdpSocket, stats: Arc<StreamStats>, mut handle: H)
where
    H: FnMut(&[u8]) -> Result<bool, DecodeError> + Send + 'static,
{
    log::debug!("{} worker running on {}", stats.name, stats.local_addr());
    let _guard = AliveGuard(stats.clone());
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                log::debug!("{} socket: transient error {}", stats.name, e);
                continue;
            }
            Err(e) => {
                log::error!("{} worker stopped: {}", stats.name, e);
                return;
            }
        };

        stats.record_datagram();
        match handle(&buf[..len]) {
            Ok(true) => {
                stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) => {
                log::warn!("Dropping {} datagram from {} ({} bytes): {}", stats.name, peer, len, e);
                stats.record_error(&e);
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}
