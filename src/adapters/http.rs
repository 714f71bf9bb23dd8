//! HTTP surface: the MCP endpoint and the download directory.
//!
//! Routes:
//! - `POST /mcp` - JSON-RPC tool calls
//! - `GET /downloads/{id}` - generated spreadsheets, served from the registry root

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::mcp::McpHandler;
use crate::config::ResolvedConfig;
use crate::config::ServerSettings;
use crate::core::{ArtifactRegistry, ExcelService, TracingObserver};

/// Build the application router
pub fn router(handler: McpHandler, downloads: &Path, settings: &ServerSettings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/mcp", post(mcp_endpoint))
        .nest_service("/downloads", ServeDir::new(downloads))
        .with_state(handler)
        .layer(DefaultBodyLimit::max(settings.max_body_bytes))
        .layer(TimeoutLayer::new(settings.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn mcp_endpoint(State(handler): State<McpHandler>, body: Bytes) -> Response {
    match handler.handle_body(&body).await {
        Some(response) => Json(response).into_response(),
        // Notifications are acknowledged without a body
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Run the service until `shutdown` resolves, then remove every
/// outstanding artifact.
pub async fn serve_until<F>(
    listener: TcpListener,
    config: &ResolvedConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = ArtifactRegistry::open(
        config.artifacts.registry_config(),
        Arc::new(TracingObserver),
    )
    .await
    .context("Failed to open artifact registry")?;
    let sweeper = registry.spawn_sweeper();

    let service = Arc::new(ExcelService::new(
        Arc::clone(&registry),
        config.server.public_base_url(),
    ));
    let app = router(McpHandler::new(service), registry.root(), &config.server);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Service listening on {}", addr);
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    tracing::info!("Shutting down, removing outstanding artifacts...");
    match registry.shutdown().await {
        Ok(report) => {
            for failure in &report.failed {
                tracing::warn!("Left behind {}: {}", failure.id, failure.error);
            }
        }
        Err(e) => tracing::error!("Artifact cleanup failed: {}", e),
    }
    sweeper.join().await.context("Artifact sweeper panicked")?;

    served.context("HTTP server error")?;
    tracing::info!("Service stopped");
    Ok(())
}

/// Bind the configured address and run until SIGINT/SIGTERM
pub async fn serve(config: &ResolvedConfig) -> Result<()> {
    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    serve_until(listener, config, shutdown_signal()).await
}

/// Resolves on the first termination signal
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                tracing::warn!("Could not install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
