use crate::state::ServicePhase;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facegate_core::{ErrorKind, IngestError, VerifyError};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

/// Everything a handler can fail with. Rendered as `{success:false, error}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing multipart field `{0}`")]
    MissingField(&'static str),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("service not ready: {0}")]
    NotReady(ServicePhase),

    #[error("{0}")]
    Ingest(#[from] IngestError),

    #[error("{0}")]
    Verify(#[from] VerifyError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::MissingField(_) | ApiError::Multipart(_) => ErrorKind::InvalidInput,
            ApiError::NotReady(_) => ErrorKind::ServiceNotReady,
            ApiError::Ingest(e) => e.kind(),
            ApiError::Verify(e) => e.kind(),
        }
    }

    fn status_code(&self) -> StatusCode {
        if let ApiError::Multipart(e) = self {
            return e.status();
        }
        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::DetectionFailure | ErrorKind::StoreUnavailable | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), kind = %self.kind(), error = %message, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %message, "request rejected");
        }

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
