//! HTTP surface.
//!
//! Every route under `/api` runs through the rate limit middleware before it
//! is handled; `/health` does not.

mod handlers;
mod middleware;
mod server;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::ratelimit::{Clock, RateLimitGate};

pub use handlers::{HealthResponse, PingResponse};
pub use middleware::{rate_limit, CallerPlan, ErrorBody, API_KEY_HEADER};
pub use server::HttpServer;

/// Shared state handed to handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<RateLimitGate>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(gate: Arc<RateLimitGate>, clock: Arc<dyn Clock>) -> Self {
        Self { gate, clock }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/ping", get(handlers::ping))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .with_state(state)
}
