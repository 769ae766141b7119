use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::store::ObservablesMeta;
use crate::telemetry::{ObservablesSnapshot, PvtFix};
use crate::web::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestPvtResponse {
    pub ok: bool,
    /// Null until the first fix arrives.
    #[schema(value_type = Option<PvtFix>)]
    pub pvt: Option<Arc<PvtFix>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestObservablesResponse {
    pub ok: bool,
    pub meta: ObservablesMeta,
    /// Most recent first.
    #[schema(value_type = Vec<ObservablesSnapshot>)]
    pub observables: Vec<Arc<ObservablesSnapshot>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ObservablesQuery {
    /// Number of snapshots. Clamped to the history capacity; anything that
    /// is not a number falls back to the configured default.
    #[serde(default)]
    pub limit: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/latest/pvt",
    responses(
        (status = 200, description = "Latest position fix", body = LatestPvtResponse)
    ),
    tag = "telemetry"
)]
pub async fn latest_pvt(State(state): State<AppState>) -> Json<LatestPvtResponse> {
    Json(LatestPvtResponse {
        ok: true,
        pvt: state.store.latest_pvt(),
    })
}

#[utoipa::path(
    get,
    path = "/api/latest/observables",
    params(ObservablesQuery),
    responses(
        (status = 200, description = "Recent observables snapshots", body = LatestObservablesResponse)
    ),
    tag = "telemetry"
)]
pub async fn latest_observables(
    State(state): State<AppState>,
    Query(query): Query<ObservablesQuery>,
) -> Json<LatestObservablesResponse> {
    let limit = parse_limit(
        query.limit.as_deref(),
        state.config.telemetry.default_limit,
    );
    let observables = state.store.recent_observables(limit);
    Json(LatestObservablesResponse {
        ok: true,
        meta: state.store.observables_meta(),
        observables,
    })
}

/// Negative values become 0; the store caps the upper end.
fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => {
            if n <= 0.0 {
                0
            } else {
                n.min(usize::MAX as f64) as usize
            }
        }
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_parsing() {
        assert_eq!(parse_limit(None, 64), 64);
        assert_eq!(parse_limit(Some("10"), 64), 10);
        assert_eq!(parse_limit(Some("-5"), 64), 0);
        assert_eq!(parse_limit(Some("2.9"), 64), 2);
        assert_eq!(parse_limit(Some("1e12"), 64), 1_000_000_000_000);
        assert_eq!(parse_limit(Some("lots"), 64), 64);
        assert_eq!(parse_limit(Some("NaN"), 64), 64);
        assert_eq!(parse_limit(Some(""), 64), 64);
    }
}
