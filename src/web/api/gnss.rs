use axum::{
    extract::{Path, State},
    Json,
};

use crate::supervisor::{ControlResult, ProcessStatus};
use crate::web::api::error::{control, ApiResult};
use crate::web::AppState;

#[utoipa::path(
    post,
    path = "/api/gnss/start",
    responses(
        (status = 200, description = "Receiver started with profile conf1", body = ControlResult),
        (status = 409, description = "Receiver already running", body = ControlResult),
        (status = 500, description = "Launch failed", body = ControlResult)
    ),
    tag = "gnss"
)]
pub async fn start(State(state): State<AppState>) -> ApiResult<Json<ControlResult>> {
    start_profile(&state, "conf1").await
}

#[utoipa::path(
    post,
    path = "/api/gnss/start-alt",
    responses(
        (status = 200, description = "Receiver started with profile conf2", body = ControlResult),
        (status = 409, description = "Receiver already running", body = ControlResult),
        (status = 500, description = "Launch failed", body = ControlResult)
    ),
    tag = "gnss"
)]
pub async fn start_alt(State(state): State<AppState>) -> ApiResult<Json<ControlResult>> {
    start_profile(&state, "conf2").await
}

#[utoipa::path(
    post,
    path = "/api/gnss/start-leo",
    responses(
        (status = 200, description = "Receiver started with profile conf3", body = ControlResult),
        (status = 409, description = "Receiver already running", body = ControlResult),
        (status = 500, description = "Launch failed", body = ControlResult)
    ),
    tag = "gnss"
)]
pub async fn start_leo(State(state): State<AppState>) -> ApiResult<Json<ControlResult>> {
    start_profile(&state, "conf3").await
}

#[utoipa::path(
    post,
    path = "/api/gnss/start/{profile}",
    params(
        ("profile" = String, Path, description = "Configured profile name")
    ),
    responses(
        (status = 200, description = "Receiver started", body = ControlResult),
        (status = 404, description = "No such profile", body = ControlResult),
        (status = 409, description = "Receiver already running", body = ControlResult),
        (status = 500, description = "Launch failed", body = ControlResult)
    ),
    tag = "gnss"
)]
pub async fn start_named(
    State(state): State<AppState>,
    Path(profile): Path<String>,
) -> ApiResult<Json<ControlResult>> {
    start_profile(&state, &profile).await
}

#[utoipa::path(
    post,
    path = "/api/gnss/stop",
    responses(
        (status = 200, description = "Receiver stopped (or was not running)", body = ControlResult)
    ),
    tag = "gnss"
)]
pub async fn stop(State(state): State<AppState>) -> ApiResult<Json<ControlResult>> {
    log::info!("Stop requested");
    control(state.supervisor.stop().await)
}

#[utoipa::path(
    get,
    path = "/api/gnss/status",
    responses(
        (status = 200, description = "Current receiver status", body = ProcessStatus)
    ),
    tag = "gnss"
)]
pub async fn status(State(state): State<AppState>) -> Json<ProcessStatus> {
    Json(state.supervisor.status())
}

async fn start_profile(state: &AppState, profile: &str) -> ApiResult<Json<ControlResult>> {
    log::info!("Start requested for profile {}", profile);
    control(state.supervisor.start(profile).await)
}
