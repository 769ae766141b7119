use utoipa::OpenApi;

use super::api::health::HealthResponse;
use super::api::telemetry::{LatestObservablesResponse, LatestPvtResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::telemetry::latest_pvt,
        super::api::telemetry::latest_observables,
        super::api::gnss::start,
        super::api::gnss::start_alt,
        super::api::gnss::start_leo,
        super::api::gnss::start_named,
        super::api::gnss::stop,
        super::api::gnss::status,
        super::api::health::health,
    ),
    components(
        schemas(
            LatestPvtResponse,
            LatestObservablesResponse,
            HealthResponse,
            crate::telemetry::PvtFix,
            crate::telemetry::Vector3,
            crate::telemetry::Enu,
            crate::telemetry::Dop,
            crate::telemetry::ObservablesSnapshot,
            crate::telemetry::ObservableRecord,
            crate::telemetry::TrackingFlags,
            crate::store::ObservablesMeta,
            crate::ingest::StreamHealth,
            crate::supervisor::ControlResult,
            crate::supervisor::ProcessStatus,
            crate::supervisor::ProcessState,
            crate::supervisor::ExitDetail,
        )
    ),
    info(
        title = "GNSS Relay API",
        description = "Live receiver telemetry and receiver process control",
        version = "0.1.0"
    ),
    tags(
        (name = "telemetry", description = "Latest decoded telemetry"),
        (name = "gnss", description = "Receiver process control"),
        (name = "health", description = "Relay health")
    )
)]
pub struct ApiDoc;
