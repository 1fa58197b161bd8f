use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Backend unavailable: {0}")]
    Backend(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<medalcast_core::Error> for ApiError {
    fn from(e: medalcast_core::Error) -> Self {
        use medalcast_core::Error;
        match e {
            Error::Config(msg) => Self::Internal(msg),
            other => Self::Backend(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Backend(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again.".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
