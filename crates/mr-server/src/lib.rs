//! mr-server: the HTTP adapter in front of the processing pipeline.
//!
//! - `POST /api/process` runs one request synchronously and answers with
//!   the standard result envelope.
//! - `GET /health` reports process identity and dependency readiness.
//! - `GET /api-docs/openapi.json` serves the OpenAPI document.
//!
//! Shutdown on SIGINT/SIGTERM is graceful: the listener stops accepting and
//! in-flight runs are cancelled through the context's shutdown token.

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use mr_core::config::Config;

use crate::context::AppContext;

/// Start the mediarelay server and run until a shutdown signal arrives.
pub async fn start(config: Config) -> mr_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| mr_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::from_config(config)?;

    for info in ctx.tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| mr_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    serve(listener, ctx).await
}

/// Serve the API on an already-bound listener until shutdown.
pub async fn serve(listener: TcpListener, ctx: AppContext) -> mr_core::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Starting server on {addr}");
    }

    let shutdown = ctx.shutdown.clone();
    let app = router::build_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| mr_core::Error::Internal(format!("Server error: {e}")))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT, SIGTERM, or the token, then cancel in-flight runs.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
