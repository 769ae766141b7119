use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::supervisor::ControlResult;

pub enum ApiError {
    /// A start/stop request the supervisor refused or could not carry out.
    Control(ControlResult),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Control(result) => {
                let status = match result.error.as_deref() {
                    Some("busy") => StatusCode::CONFLICT,
                    Some("unknown_profile") => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(result)).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Turns a failed control result into an error so the handler responds with
/// the matching status code. The body is the result either way.
pub fn control(result: ControlResult) -> ApiResult<Json<ControlResult>> {
    if result.ok {
        Ok(Json(result))
    } else {
        Err(ApiError::Control(result))
    }
}
