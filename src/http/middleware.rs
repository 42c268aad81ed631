//! Rate limit middleware.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HeaderName, RETRY_AFTER};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::ratelimit::Verdict;

/// Header carrying the caller's credential.
pub const API_KEY_HEADER: &str = "x-api-key";

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Origin used when the peer address is not known.
const UNKNOWN_ORIGIN: &str = "unknown";

/// Plan resolved for the current request, available to handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerPlan(pub String);

/// Body of a rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn origin_of(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

/// Run the gate and either reject with 429 or pass the request on.
pub async fn rate_limit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let credential = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let origin = origin_of(&request);
    let now = state.clock.now();

    match state.gate.check(credential.as_deref(), &origin, now).await {
        Verdict::Allow {
            plan,
            limit,
            remaining,
        } => {
            request.extensions_mut().insert(CallerPlan(plan));
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Verdict::FailOpen { plan, .. } => {
            request.extensions_mut().insert(CallerPlan(plan));
            next.run(request).await
        }
        Verdict::Deny {
            plan,
            reason,
            retry_after,
        } => {
            info!(origin = %origin, plan = %plan, path = %request.uri().path(), "Request rejected");
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, Json(ErrorBody { error: reason })).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after.as_secs().max(1)));
            response
        }
    }
}
