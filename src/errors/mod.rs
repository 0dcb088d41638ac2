use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const TRACK_FAILED_MESSAGE: &str = "Failed to track event";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("failed to read request body")]
    Body(#[from] BytesRejection),
    #[error("invalid event payload")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("store request failed")]
    StoreRequest(#[from] reqwest::Error),
    #[error("store rejected insert with status {status}: {body}")]
    StoreRejected { status: u16, body: String },
    #[error("store reported insert errors: {0}")]
    InsertErrors(serde_json::Value),
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for AppError {
    // Every failure kind collapses to the same response; the detail only goes to the log.
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "error tracking event");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: TRACK_FAILED_MESSAGE,
            }),
        )
            .into_response()
    }
}
