//! HTTP server implementation using Axum.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use docqa_core::Result;
use docqa_rag::QaService;

use crate::routes;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QaService>,
    /// Directory served under `/static`; an `index.html` here replaces the
    /// built-in front page.
    pub static_dir: PathBuf,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::homepage))
        .route("/ask", post(routes::ask))
        .route("/refresh-index", post(routes::refresh_index))
        .route("/stats", get(routes::stats))
        .route("/health", get(routes::health))
        .nest_service("/static", static_files)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("🌐 docqa listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
