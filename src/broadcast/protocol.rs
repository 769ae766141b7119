//! Frames pushed to real-time clients.
//!
//! JSON, one object per websocket text message:
//!
//! ```json
//! {"type": "pvt", "pvt": {...}}
//! {"type": "observables", "snapshots": [...], "meta": {...}}
//! {"type": "status", "status": {...}}
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::store::ObservablesMeta;
use crate::supervisor::ProcessStatus;
use crate::telemetry::{ObservablesSnapshot, PvtFix};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// `pvt` is null until the first fix arrives.
    Pvt { pvt: Option<Arc<PvtFix>> },
    /// Snapshots are most recent first.
    Observables {
        snapshots: Vec<Arc<ObservablesSnapshot>>,
        meta: ObservablesMeta,
    },
    Status { status: ProcessStatus },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Pvt { .. } => "pvt",
            ServerEvent::Observables { .. } => "observables",
            ServerEvent::Status { .. } => "status",
        }
    }
}
