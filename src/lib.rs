//! wallet-ledger Library
//!
//! Wallet ledger engine, storage backends, request signing and the HTTP
//! surface. Re-exports modules for integration testing and the binary.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod idempotency;
pub mod jobs;
pub mod signing;
pub mod store;

use axum::{extract::State, http::StatusCode, middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use api::AppState;
pub use config::Config;
pub use domain::{DomainError, OperationContext};
pub use error::AppError;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run outermost-last: logging -> signature -> principal -> handler
    let protected_routes = api::create_router()
        .layer(middleware::from_fn(api::middleware::principal_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::signature_middleware,
        ))
        .layer(middleware::from_fn(api::middleware::logging_middleware));

    Router::new()
        // Health check (no auth)
        .route("/health", get(health_check))
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(err) => {
            tracing::error!(error = %err, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}
