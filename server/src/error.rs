use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use audiosub::{FailureKind, ServiceError, WorkerError};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Multipart(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Service(e) => service_status(e),
        }
    }
}

fn service_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::NotFound { .. } | ServiceError::ArtifactMissing { .. } => {
            StatusCode::NOT_FOUND
        }
        ServiceError::NotReady { .. } => StatusCode::CONFLICT,
        ServiceError::Worker(WorkerError::QueueFull { .. } | WorkerError::ChannelClosed) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => match error.failure_kind() {
            Some(FailureKind::InvalidInput | FailureKind::UnsupportedFormat) => {
                StatusCode::BAD_REQUEST
            }
            Some(FailureKind::PayloadTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            Some(FailureKind::EngineUnavailable | FailureKind::MemoryExhausted) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Some(FailureKind::TranscriptionTimeout) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
