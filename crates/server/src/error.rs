//! Translation of scheduler rejections into HTTP responses.
//!
//! Every rejection class gets a fixed status code so clients can react
//! without parsing message text. The body is always
//! `{"error": <class>, "message": <detail>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use scriptorium_scheduler::ScheduleError;

/// Newtype so `ScheduleError` can flow out of handlers with `?`.
pub struct ApiError(pub ScheduleError);

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, class) = match &self.0 {
            ScheduleError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ScheduleError::Authorization(_) => (StatusCode::FORBIDDEN, "authorization"),
            ScheduleError::Unavailable(_) => (StatusCode::CONFLICT, "unavailable"),
            ScheduleError::Saturated(_) => (StatusCode::SERVICE_UNAVAILABLE, "saturated"),
            ScheduleError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = Json(json!({"error": class, "message": self.0.to_string()}));
        (status, body).into_response()
    }
}

/// 404 with the same body shape as [`ApiError`].
pub fn not_found(what: &str) -> Response {
    let body = Json(json!({"error": "not-found", "message": format!("{} not found", what)}));
    (StatusCode::NOT_FOUND, body).into_response()
}
