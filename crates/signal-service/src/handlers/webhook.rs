//! RTC provider webhook handler.
//!
//! Membership changes in group rooms fan out to the group as
//! participant-connected/disconnected notifications.

use crate::errors::SignalError;
use crate::handlers::records::Empty;
use crate::routes::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Handler for POST /v1/rtc/webhook
///
/// # Response
///
/// - 200 OK: Event accepted (including events that need no action)
/// - 403 Forbidden: Signature or body digest did not verify
#[instrument(skip_all)]
pub async fn rtc_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Empty>, SignalError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let event = state.webhooks.receive(authorization, &body)?;
    debug!(target: "signal.handlers", event = %event.event, "Webhook received");

    if let Some(envelope) = state.engine.handle_webhook_event(&event).await? {
        if let Err(e) = state.relay.send(&envelope).await {
            warn!(
                target: "signal.handlers",
                error = %e,
                group_id = %envelope.group_id,
                "Failed to relay membership notification"
            );
        }
    }

    Ok(Json(Empty {}))
}
