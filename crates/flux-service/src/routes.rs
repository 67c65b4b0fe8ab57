//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, dispatch, health, paypal};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Webhooks (verified with PayPal)
/// - `POST /paypal/notify` - PayPal Instant Payment Notification
///
/// ## Admin (`X-Admin-Key`)
/// - `GET /v1/servers` - Registered server groups
/// - `GET /v1/servers/:server/accounts/:account_id/credits` - Donation credits
/// - `GET /v1/servers/:server/transactions` - PayPal audit rows
///
/// ## Panel
/// - any other `GET` - Resolved module/action route
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/servers", get(admin::list_servers))
        .route(
            "/servers/:server/accounts/:account_id/credits",
            get(admin::get_credits),
        )
        .route(
            "/servers/:server/transactions",
            get(admin::list_transactions),
        );

    Router::new()
        .route("/health", get(health::health))
        .route("/paypal/notify", post(paypal::paypal_notify))
        .nest("/v1", admin_routes)
        .fallback(dispatch::dispatch)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
