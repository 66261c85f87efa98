//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Health / heartbeat route and the OpenAPI document
//! - `/api` routes, with a JSON 404 for anything unmatched under `/api`,
//!   including a known path with the wrong method
//! - The built SPA for every other path, when its directory exists

pub mod doc;
mod health;
mod invoke;

use std::sync::Arc;

use axum::http::{Method, Uri};
use axum::routing::get;
use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::error::ServerError;
use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(invoke::router())
        .fallback(not_found)
        .method_not_allowed_fallback(not_found);

    let mut app = Router::new()
        .merge(health::router())
        .route("/api-docs/openapi.json", get(doc::openapi_json))
        .nest("/api", api_router)
        .method_not_allowed_fallback(not_found);

    let static_dir = &state.config.static_dir;
    if static_dir.is_dir() {
        info!(dir = %static_dir.display(), "serving static assets");
        let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(spa);
    } else {
        app = app.fallback(not_found);
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

async fn not_found(method: Method, uri: Uri) -> ServerError {
    ServerError::NotFound {
        path: uri.path().to_owned(),
        method: method.to_string(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
