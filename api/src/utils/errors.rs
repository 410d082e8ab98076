//! Maps [`gallery_core::ApiError`] onto an axum response.
//!
//! `gallery-core` stays web-framework agnostic and only ever returns
//! `Result<_, gallery_core::ApiError>`; this is the one place `ErrorKind`
//! becomes an actual `StatusCode`, the way thorium's own
//! `api/src/utils/errors.rs` maps its error type to a response at the edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gallery_core::{ApiError as CoreError, ErrorKind};
use tracing::{event, Level};

/// A thin newtype so we can implement the foreign `IntoResponse` trait on
/// the core's error type without forking it.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ResourceLimit => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = status_for(self.0.kind);
        let msg = self.0.msg.unwrap_or_else(|| self.0.kind.to_string());
        event!(Level::ERROR, kind = %self.0.kind, msg = %msg, "request failed");
        (code, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}
