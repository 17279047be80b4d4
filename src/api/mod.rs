//! API 模块
//!
//! 提供 JSON-RPC 端点以及可观测性路由。

pub mod app_state;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::error::AppError;
use crate::observability::{ObservabilityState, create_observability_router, metrics_middleware};
use crate::security::middleware::security_headers_middleware;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(app_state: AppState) -> Router {
    let sessions = app_state.session_store.clone();
    let observability = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        app_state.metrics.clone(),
        app_state.fatal.clone(),
        Arc::new(move || sessions.len()),
    ));
    let metrics = app_state.metrics.clone();
    let max_request_size = app_state.max_request_size;

    Router::new()
        .merge(routes::rpc_routes::create_rpc_router())
        .with_state(app_state)
        .merge(create_observability_router(observability))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            metrics_middleware,
        ))
        // Add security headers middleware to all routes
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}

pub async fn initialize_api(app_state: AppState) -> Result<Router, AppError> {
    tracing::info!("Initializing API router...");
    Ok(create_router(app_state))
}
