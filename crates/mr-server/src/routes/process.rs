//! Process route: run one request through the pipeline.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use mr_av::TransformSpec;
use mr_core::{Error, RequestId};
use mr_pipeline::{RunFailure, RunReport, Stage};

use crate::context::AppContext;
use crate::error::{ApiError, ErrorBody};

/// Request body for `POST /api/process`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBody {
    /// Absolute `http`/`https` URL of the source media.
    pub source_location: Option<String>,
    /// Storage key for the result; a leading `/` is ignored.
    pub output_identity: Option<String>,
    /// Style name, `{"style": ...}`, or `{"filter": ...}`.
    pub transform: Option<TransformSpec>,
}

/// Response envelope for every outcome of a run.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(rename = "publicURL", skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub request_id: String,
}

impl ProcessResponse {
    pub fn success(report: &RunReport) -> Self {
        Self {
            success: true,
            public_url: Some(report.result.public_url.clone()),
            storage_key: Some(report.result.storage_key.clone()),
            error: None,
            request_id: report.request_id.to_string(),
        }
    }

    pub fn failure(request_id: RequestId, error: ErrorBody) -> Self {
        Self {
            success: false,
            public_url: None,
            storage_key: None,
            error: Some(error),
            request_id: request_id.to_string(),
        }
    }

    /// Envelope for a finished run, success or not.
    pub fn from_outcome(outcome: &Result<RunReport, RunFailure>) -> Self {
        match outcome {
            Ok(report) => Self::success(report),
            Err(f) => Self::failure(f.request_id, ErrorBody::new(f.stage, &f.error)),
        }
    }
}

/// POST /api/process
#[utoipa::path(
    post,
    path = "/api/process",
    request_body = ProcessBody,
    responses(
        (status = 200, description = "Artifact published", body = ProcessResponse),
        (status = 400, description = "Invalid request or transform", body = ProcessResponse),
        (status = 422, description = "Transcoder exited non-zero", body = ProcessResponse),
        (status = 502, description = "Source or store failed", body = ProcessResponse),
        (status = 503, description = "Dependency unavailable or run cancelled", body = ProcessResponse),
        (status = 504, description = "Stage timed out", body = ProcessResponse)
    )
)]
pub async fn process(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ProcessBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::info!("Rejected request body: {}", rejection.body_text());
            return ApiError::new(
                request_id,
                Stage::Validation,
                Error::Validation(rejection.body_text()),
            )
            .into_response();
        }
    };

    // Dropping this handler (caller disconnect) drops the run future, which
    // kills any child process and releases the workspace.
    let cancel = ctx.shutdown.child_token();

    let outcome = ctx
        .coordinator
        .submit(
            request_id,
            body.source_location.as_deref().unwrap_or_default(),
            body.output_identity.as_deref().unwrap_or_default(),
            body.transform,
            &cancel,
        )
        .await;

    match outcome {
        Ok(report) => Json(ProcessResponse::success(&report)).into_response(),
        Err(failure) => ApiError::from(failure).into_response(),
    }
}
