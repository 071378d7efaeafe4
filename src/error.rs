//! Request errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pickgok_core::TrackId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecommendError {
    /// Resources have not been published yet
    #[error("AI Server not ready")]
    NotReady,

    #[error("Missing 'track_id'")]
    MissingTrackId,

    #[error("Invalid 'track_id': {0}")]
    InvalidTrackId(String),

    #[error("Invalid 'k': {0}")]
    InvalidK(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Track ID {0} not found.")]
    NotFound(TrackId),

    /// Failure while reconstructing or searching; carries the cause's message
    #[error("{0}")]
    Internal(String),
}

impl RecommendError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RecommendError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            RecommendError::MissingTrackId
            | RecommendError::InvalidTrackId(_)
            | RecommendError::InvalidK(_)
            | RecommendError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RecommendError::NotFound(_) => StatusCode::NOT_FOUND,
            RecommendError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for RecommendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("Recommendation failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
