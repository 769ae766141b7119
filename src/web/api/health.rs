use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::ingest::StreamHealth;
use crate::store::ObservablesMeta;
use crate::supervisor::ProcessState;
use crate::web::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// False once any ingestion worker has died.
    pub ok: bool,
    pub streams: Vec<StreamHealth>,
    pub clients: usize,
    pub events_published: u64,
    pub clients_evicted: u64,
    pub receiver: ProcessState,
    /// When the latest fix was stored.
    pub last_pvt: Option<DateTime<Utc>>,
    pub observables: ObservablesMeta,
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Ingestion and broadcast health", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let streams: Vec<StreamHealth> = state.streams.iter().map(|s| s.snapshot()).collect();
    Json(HealthResponse {
        ok: streams.iter().all(|s| s.alive),
        streams,
        clients: state.broadcaster.client_count(),
        events_published: state.broadcaster.published(),
        clients_evicted: state.broadcaster.evicted(),
        receiver: state.supervisor.status().state,
        last_pvt: state.store.pvt_updated_at(),
        observables: state.store.observables_meta(),
    })
}
