use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Vision model error: {0}")]
    Vision(String),

    #[error("Vision model unavailable: {0}")]
    VisionUnavailable(String),

    #[error("Vision rate limit exceeded, retry after {retry_after:?} seconds")]
    VisionRateLimit { retry_after: Option<u64> },

    #[error("Drive error: {0}")]
    Drive(String),

    #[error("Drive authentication error: {0}")]
    DriveAuth(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for MeterError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            MeterError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            MeterError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            MeterError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            MeterError::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            MeterError::Json(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            MeterError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            MeterError::Image(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            MeterError::Vision(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            MeterError::VisionUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            MeterError::VisionRateLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            MeterError::Drive(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            MeterError::DriveAuth(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            MeterError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MeterError>;
