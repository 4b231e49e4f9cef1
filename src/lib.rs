// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod hub;
pub mod limits;
pub mod messages;
pub mod state;
pub mod tasks;
pub mod types;

use axum::{middleware, routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the full application router.
///
/// /health sits outside the admission middleware so the liveness probe
/// bypasses all rate limiting.
pub fn router(state: Arc<AppState>) -> Router {
    let limited = Router::new()
        .route("/register", post(api::register))
        .route("/stream", get(api::stream))
        .route("/messages", post(api::post_message).get(api::list_messages))
        .route("/agents", get(api::list_agents))
        .route("/heartbeat", post(api::heartbeat))
        .route("/disconnect", post(api::disconnect))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            limits::admission_middleware,
        ));

    Router::new()
        .route("/health", get(api::health))
        .merge(limited)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
