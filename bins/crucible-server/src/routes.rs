// Route table and middleware stack.

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use crucible_common::config::Config;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::{access_log, rate_limit, request_id, RateLimiter};
use crate::AppState;

pub fn router(state: AppState, config: &Config) -> Router {
    let limiter = RateLimiter::new(config.rate_limit, config.rate_window);

    // Execution endpoints sit behind the per-IP limiter; /health does not.
    let api = Router::new()
        .route("/execute", post(handlers::execute))
        .route("/submit", post(handlers::submit))
        .layer(middleware::from_fn_with_state(limiter, rate_limit));

    Router::new()
        .route("/health", get(|| async { (StatusCode::OK, "OK") }))
        .merge(api)
        .with_state(state)
        .layer(middleware::from_fn(request_id))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(access_log))
        .layer(CatchPanicLayer::new())
}
