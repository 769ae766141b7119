use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::ingest::StreamStats;
use crate::store::StateStore;
use crate::supervisor::Supervisor;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<StateStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub supervisor: Arc<Supervisor>,
    pub streams: Arc<[Arc<StreamStats>]>,
}
