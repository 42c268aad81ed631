//! Request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::middleware::CallerPlan;
use super::AppState;

/// Body of a successful `/api/ping`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    /// Always `"pong!"`
    pub message: String,
    /// Plan the caller was classified into
    pub your_plan: String,
}

/// Body of `/health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: String,
    /// `"up"`, `"down"` or `"disabled"`
    pub store: String,
}

/// Echo the caller's plan.
pub async fn ping(Extension(CallerPlan(plan)): Extension<CallerPlan>) -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong!".to_string(),
        your_plan: plan,
    })
}

/// Liveness plus store reachability. Always 200: the service keeps serving
/// (unthrottled) while the store is down.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.gate.store_status().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        store: store.as_str().to_string(),
    })
}
