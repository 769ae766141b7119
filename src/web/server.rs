use axum::{routing::get, routing::get_service, routing::post, Router};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::ingest::{IngestError, UdpReceivers};
use crate::store::StateStore;
use crate::supervisor::Supervisor;

use super::api::gnss as gnss_handlers;
use super::api::health as health_handlers;
use super::api::telemetry as telemetry_handlers;
use super::api_doc::ApiDoc;
use super::state::AppState;
use super::ws;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client-side routes of the front-end; each one serves `index.html`.
const SPA_ROUTES: [&str; 4] = ["/", "/summary", "/historics", "/observables"];

pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let bind_addr = config.web.bind.clone();

    let store = Arc::new(StateStore::new(config.telemetry.history_capacity));
    let broadcaster = Arc::new(Broadcaster::new(
        store.clone(),
        config.broadcast.backlog,
        config.telemetry.default_limit,
    ));
    let supervisor = Supervisor::new(config.supervisor.clone());
    let profiles: Vec<&str> = supervisor.profiles().collect();
    if profiles.is_empty() {
        log::warn!("No receiver profiles configured; start requests will be refused");
    } else {
        log::info!("Receiver profiles: {}", profiles.join(", "));
    }
    let status_forwarder = broadcaster.follow_status(supervisor.subscribe());

    // Both UDP ports must be ours before the HTTP side comes up.
    let receivers = UdpReceivers::bind(&config.telemetry).await?;
    let ingestion = receivers.spawn(store.clone(), broadcaster.clone())?;

    let state = AppState {
        config: Arc::new(config),
        store,
        broadcaster,
        supervisor: supervisor.clone(),
        streams: ingestion.streams().to_vec().into(),
    };
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let stopped = supervisor.stop().await;
    log::info!("Receiver: {}", stopped.message);
    ingestion.shutdown();
    status_forwarder.abort();

    served.map_err(ServerError::from)
}

pub fn router(state: AppState) -> Router {
    let static_dir = state.config.web.static_dir.clone();
    let index = static_dir.join("index.html");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        // Telemetry
        .route("/api/latest/pvt", get(telemetry_handlers::latest_pvt))
        .route(
            "/api/latest/observables",
            get(telemetry_handlers::latest_observables),
        )
        // Receiver control
        .route("/api/gnss/start", post(gnss_handlers::start))
        .route("/api/gnss/start-alt", post(gnss_handlers::start_alt))
        .route("/api/gnss/start-leo", post(gnss_handlers::start_leo))
        .route("/api/gnss/start/{profile}", post(gnss_handlers::start_named))
        .route("/api/gnss/stop", post(gnss_handlers::stop))
        .route("/api/gnss/status", get(gnss_handlers::status))
        .route("/api/health", get(health_handlers::health))
        // Live updates
        .route("/ws", get(ws::upgrade));

    for route in SPA_ROUTES {
        app = app.route(route, get_service(ServeFile::new(&index)));
    }

    app
        // Static front-end
        .fallback_service(ServeDir::new(static_dir))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received, stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::config::{ProfileConfig, SupervisorConfig};
    use crate::supervisor::ProcessState;
    use crate::telemetry::testing::{sample_fix, sample_snapshot};
    use crate::web::api::telemetry::ObservablesQuery;

    fn test_state(profiles: &[(&str, ProfileConfig)]) -> AppState {
        let config = Config {
            supervisor: SupervisorConfig {
                profiles: profiles
                    .iter()
                    .map(|(name, p)| (name.to_string(), p.clone()))
                    .collect(),
                ..SupervisorConfig::default()
            },
            ..Config::default()
        };
        let store = Arc::new(StateStore::new(4));
        let broadcaster = Arc::new(Broadcaster::new(store.clone(), 8, 4));
        AppState {
            supervisor: Supervisor::new(config.supervisor.clone()),
            config: Arc::new(config),
            store,
            broadcaster,
            streams: Arc::new([]),
        }
    }

    fn query(limit: Option<&str>) -> Query<ObservablesQuery> {
        Query(ObservablesQuery {
            limit: limit.map(str::to_string),
        })
    }

    #[test]
    fn router_builds() {
        let _ = router(test_state(&[]));
    }

    #[tokio::test]
    async fn latest_pvt_is_null_until_a_fix_arrives() {
        let state = test_state(&[]);
        let empty = telemetry_handlers::latest_pvt(State(state.clone())).await;
        assert!(empty.ok);
        assert!(empty.pvt.is_none());

        state.store.set_latest_pvt(sample_fix());
        let json = serde_json::to_value(&*telemetry_handlers::latest_pvt(State(state)).await).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["pvt"]["week"], 2335);
    }

    #[tokio::test]
    async fn latest_observables_clamps_limit() {
        let state = test_state(&[]);
        for seq in 1..=6 {
            state.store.append_observables(sample_snapshot(seq));
        }

        let all = telemetry_handlers::latest_observables(State(state.clone()), query(Some("100"))).await;
        assert_eq!(all.observables.len(), 4);
        assert_eq!(all.observables[0].sequence, 6);
        assert_eq!(all.meta.capacity, 4);

        let none = telemetry_handlers::latest_observables(State(state.clone()), query(Some("-3"))).await;
        assert!(none.observables.is_empty());

        // Default limit from config (64) is still capped by capacity.
        let default = telemetry_handlers::latest_observables(State(state), query(None)).await;
        assert_eq!(default.observables.len(), 4);
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let state = test_state(&[]);
        let response = gnss_handlers::start_named(State(state.clone()), Path("conf9".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.supervisor.status().state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn stop_when_idle_is_ok() {
        let state = test_state(&[]);
        let response = gnss_handlers::stop(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_start_is_conflict() {
        let profile = ProfileConfig {
            program: Some("sleep".to_string()),
            args: vec!["30".to_string()],
            ..ProfileConfig::default()
        };
        let state = test_state(&[("conf1", profile)]);

        let first = gnss_handlers::start(State(state.clone())).await.into_response();
        assert_eq!(first.status(), StatusCode::OK);
        let second = gnss_handlers::start(State(state.clone())).await.into_response();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let stopped = gnss_handlers::stop(State(state.clone())).await.into_response();
        assert_eq!(stopped.status(), StatusCode::OK);
        assert_eq!(state.supervisor.status().state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn health_reports_broadcaster_and_store() {
        let state = test_state(&[]);
        let _client = state.broadcaster.register();
        let health = health_handlers::health(State(state)).await;
        assert!(health.ok);
        assert_eq!(health.clients, 1);
        assert_eq!(health.receiver, ProcessState::Stopped);
    }
}
