use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by the dashboard API. Storage failures are reduced to a
/// generic message plus a machine-readable code; backend error text never
/// reaches the wire.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Storage,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Storage => "storage_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::BadRequest(message) => message,
            ApiError::Storage => "The operation could not be completed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}
