//! HTTP routes for the signal service.
//!
//! Defines the Axum router and application state.

use crate::clients::MessagingRelay;
use crate::engine::SignalingEngine;
use crate::handlers;
use crate::rtc::webhook::WebhookReceiver;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Verb state machine and lookups.
    pub engine: SignalingEngine,

    /// Delivers assembled envelopes.
    pub relay: Arc<dyn MessagingRelay>,

    /// Authenticates provider webhooks.
    pub webhooks: WebhookReceiver,

    /// Database pool for health checks. Absent when running on fakes.
    pub pool: Option<PgPool>,

    /// Per-request deadline bounding provider and relay calls.
    pub request_timeout: Duration,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/signal/*` - Signaling verbs, lookups and history
/// - `/v1/rtc/webhook` - Provider room events
/// - `/v1/health` - Health check endpoint (database ping)
/// - `/metrics` - Prometheus scrape endpoint, when a handle is supplied
/// - TraceLayer for request logging
/// - Request timeout from configuration
pub fn build_routes(state: Arc<AppState>, metrics: Option<PrometheusHandle>) -> Router {
    let timeout = state.request_timeout;

    let signal_routes = Router::new()
        .route("/v1/signal/assemble", post(handlers::signal_assemble))
        .route(
            "/v1/signal/invitation/room",
            post(handlers::get_signal_invitation_info),
        )
        .route(
            "/v1/signal/invitation/start-app",
            post(handlers::get_signal_invitation_info_start_app),
        )
        .route("/v1/signal/room/group", post(handlers::get_room_by_group_id))
        .route("/v1/signal/room/token", post(handlers::get_token_by_room_id))
        .route("/v1/signal/rooms", post(handlers::get_rooms))
        .route("/v1/signal/records", post(handlers::get_signal_invitation_records))
        .route(
            "/v1/signal/records/delete",
            post(handlers::delete_signal_records),
        )
        .route(
            "/v1/signal/records/recording",
            post(handlers::update_recording),
        )
        .route("/v1/rtc/webhook", post(handlers::rtc_webhook))
        .route("/v1/health", get(handlers::health_check))
        .with_state(state);

    let app = match metrics {
        Some(handle) => signal_routes.merge(
            Router::new()
                .route("/metrics", get(handlers::metrics_handler))
                .with_state(handle),
        ),
        None => signal_routes,
    };

    // Layer order (last added runs first):
    // 1. TimeoutLayer - Timeout the request (outermost)
    // 2. TraceLayer - Log request details
    app.layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
