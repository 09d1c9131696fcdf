//! Error-to-HTTP response conversion.
//!
//! Failed runs are reported in the same envelope as successful ones
//! ([`ProcessResponse`]) with `success: false`, a machine-readable kind and
//! reason, the stage that failed, and the request's correlation id.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use mr_core::{Error, RequestId};
use mr_pipeline::{RunFailure, Stage};

use crate::routes::process::ProcessResponse;

/// Caller-facing description of a failure.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// `ValidationError`, `FetchError`, `TranscodeError`, `PublishError`,
    /// `Cancelled`, or `InternalError`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub stage: Stage,
    pub message: String,
}

impl ErrorBody {
    pub fn new(stage: Stage, error: &Error) -> Self {
        Self {
            kind: error.kind().to_string(),
            reason: error.reason().map(str::to_string),
            stage,
            message: error.to_string(),
        }
    }
}

/// A failed run on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    request_id: RequestId,
    stage: Stage,
    inner: Error,
}

impl ApiError {
    pub fn new(request_id: RequestId, stage: Stage, inner: Error) -> Self {
        Self {
            request_id,
            stage,
            inner,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.inner.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<RunFailure> for ApiError {
    fn from(f: RunFailure) -> Self {
        Self::new(f.request_id, f.stage, f.error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() && matches!(self.inner, Error::Io { .. } | Error::Internal(_)) {
            tracing::error!(
                status = %status,
                request_id = %self.request_id,
                error = %self.inner,
                "Internal fault while processing request"
            );
        }

        let body = ProcessResponse::failure(self.request_id, ErrorBody::new(self.stage, &self.inner));
        (status, Json(body)).into_response()
    }
}
