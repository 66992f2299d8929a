//! Route handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Html;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::server::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

/// Front page: `index.html` from the static dir, or the built-in page.
pub async fn homepage(State(state): State<Arc<AppState>>) -> Html<String> {
    match tokio::fs::read_to_string(state.static_dir.join("index.html")).await {
        Ok(page) => Html(page),
        Err(_) => Html(INDEX_HTML.to_string()),
    }
}

/// Answer a question. A missing or unreadable body counts as an empty
/// question and gets the guidance reply.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Json<Value> {
    let question = match body {
        Ok(Json(request)) => request.question.unwrap_or_default(),
        Err(rejection) => {
            debug!("Unreadable /ask body: {}", rejection);
            String::new()
        }
    };

    let answer = state.service.ask(&question).await;
    info!("❓ {:?} -> {:?} ({} sources)", question.trim(), answer.kind, answer.sources.len());

    Json(json!({ "answer": answer.text }))
}

/// Rebuild the index from the document directory and URL list.
pub async fn refresh_index(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.service.refresh().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "message": "Vector index refreshed successfully.",
                "chunks": report.chunks,
                "failed_urls": report.failed_urls,
            })),
        ),
        Err(e) => {
            error!("❌ Index refresh failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.service.stats() {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({ "index": stats.index, "model": stats.model })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

pub async fn health() -> &'static str {
    "ok"
}
