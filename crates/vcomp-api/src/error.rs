//! API error types and HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vcomp_media::MediaError;
use vcomp_scheduler::SchedulerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Too many jobs queued")]
    QueueFull,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Validation(v) => ApiError::BadRequest(v.to_string()),
            SchedulerError::NotFound(id) => ApiError::NotFound(format!("job {id}")),
            SchedulerError::Conflict(m) => ApiError::Conflict(m),
            SchedulerError::AdmissionRejected(_) => ApiError::QueueFull,
            SchedulerError::SceneResolution { source, .. } => media_error(source),
            SchedulerError::Media(m) => media_error(m),
        }
    }
}

fn media_error(e: MediaError) -> ApiError {
    match e {
        MediaError::PayloadTooLarge(m) => ApiError::PayloadTooLarge(m),
        MediaError::UnsupportedMediaType(m) => ApiError::UnsupportedMediaType(m),
        MediaError::InvalidEncoding(m) => ApiError::BadRequest(m),
        MediaError::FileNotFound(p) => ApiError::BadRequest(format!("file not found: {}", p.display())),
        other => ApiError::Internal(other.to_string()),
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay out of production responses.
        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcomp_models::{JobId, ValidationError};

    #[test]
    fn test_scheduler_error_mapping() {
        let e: ApiError = SchedulerError::Validation(ValidationError::new("fps", "bad")).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);

        let e: ApiError = SchedulerError::NotFound(JobId::from_string("x")).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);

        let e: ApiError = SchedulerError::AdmissionRejected(50).into();
        assert_eq!(e.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let e: ApiError = SchedulerError::conflict("already done").into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_media_error_mapping() {
        let e = media_error(MediaError::too_large("101 MiB"));
        assert_eq!(e.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let e = media_error(MediaError::unsupported("exe"));
        assert_eq!(e.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let e = media_error(MediaError::invalid_encoding("bad base64"));
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }
}
