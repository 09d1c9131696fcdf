//! Axum router construction.

use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(routes::process::process, routes::health::health),
    components(schemas(
        routes::process::ProcessBody,
        routes::process::ProcessResponse,
        routes::health::HealthResponse,
        crate::error::ErrorBody,
        mr_av::TransformSpec,
        mr_av::TranscoderStatus,
        mr_pipeline::Stage,
        mr_pipeline::PipelineHealth,
        mr_pipeline::PublisherStatus,
        mr_core::FetchReason,
        mr_core::TranscodeReason,
        mr_core::PublishReason,
    ))
)]
pub struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/process", post(routes::process::process))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
