//! `parksync serve` -- local HTTP server with the outbox interceptor.
//!
//! Every mutating request on a mapped route is recorded in the outbox
//! after the handler has succeeded and its response has been written.
//!
//! Endpoints:
//! - GET    /health                      - Server status
//! - GET    /api/{collection}            - List documents
//! - POST   /api/{collection}            - Create a document
//! - DELETE /api/{collection}            - Bulk delete (optional filter body)
//! - GET    /api/{collection}/{id}       - Fetch one document
//! - PUT    /api/{collection}/{id}       - Replace a document
//! - PATCH  /api/{collection}/{id}       - Merge fields into a document
//! - DELETE /api/{collection}/{id}       - Delete one document
//!
//! All responses use Content-Type: application/json.

mod capture;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use parksync_storage::{JsonlOutbox, MemoryOutbox, OutboxStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_create, handle_delete, handle_delete_all, handle_get, handle_health, handle_list,
    handle_not_found, handle_replace, handle_update,
};
use self::middleware::{actor_middleware, outbox_middleware};
use self::state::{InterceptState, LocalStore};
use crate::config::Config;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Assemble the router. The actor layer runs first so the interceptor
/// sees the authenticated identity.
fn router(intercept: Arc<InterceptState>, store: Arc<LocalStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let body_limit = intercept.max_body_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/{collection}",
            get(handle_list)
                .post(handle_create)
                .delete(handle_delete_all),
        )
        .route(
            "/api/{collection}/{id}",
            get(handle_get)
                .put(handle_replace)
                .patch(handle_update)
                .delete(handle_delete),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            intercept,
            outbox_middleware,
        ))
        .layer(axum_middleware::from_fn(actor_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(store)
}

async fn open_outbox(
    config: &Config,
) -> Result<Arc<dyn OutboxStore>, Box<dyn std::error::Error>> {
    match &config.outbox.path {
        Some(path) => {
            let outbox = JsonlOutbox::open(path).await?;
            tracing::info!(path = %path.display(), "outbox file opened");
            Ok(Arc::new(outbox))
        }
        None => {
            tracing::warn!("no outbox path configured; records are kept in memory only");
            Ok(Arc::new(MemoryOutbox::new()))
        }
    }
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = open_outbox(&config).await?;
    let routes = config.route_table();
    tracing::info!(
        routes = routes.entries().len(),
        exclusions = routes.exclusions().len(),
        "routing table loaded"
    );

    let intercept = Arc::new(InterceptState {
        routes,
        policy: config.reconstruct_policy(),
        outbox,
        max_body_bytes: config.server.max_body_bytes,
        max_capture_bytes: config.server.max_capture_bytes,
    });
    let app = router(intercept, Arc::new(LocalStore::default()));

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("parksync listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
