//! Signal service error types.
//!
//! Every component returns `SignalError`. Variants carry the internal detail
//! for server-side logs; `client_message()` is what leaves the process.
//! Not-found and expired are distinct here but render identically to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signal service error type.
///
/// Maps to protocol error codes:
/// - `InvalidArgument`: `ARGS` (1001)
/// - `PermissionDenied`: `NO_PERMISSION` (1002)
/// - `Conflict`: `DUPLICATE` (1003)
/// - `RoomNotFound`, `ParticipantNotFound`, `InvitationNotFound`,
///   `InvitationExpired`, `UserNotFound`: `RECORD_NOT_FOUND` (1004)
/// - `Provider`, `Relay`, `UserDirectory`: `UPSTREAM` (1005)
/// - Redis, Database, Serialization, Internal: `INTERNAL` (500)
#[derive(Debug, Error)]
pub enum SignalError {
    /// Request rejected before any side effect.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller identity does not permit the verb.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// RTC room does not exist at the provider.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Participant is not connected to the room.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// No durable invitation row for the requested key.
    #[error("Invitation not found: {0}")]
    InvitationNotFound(String),

    /// Cache miss: the invitation expired or was never cached.
    #[error("Invitation expired or unknown: {0}")]
    InvitationExpired(String),

    /// User directory has no such user.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// State transition refused (row already handled).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// RTC room provider failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Messaging relay refused or failed the envelope.
    #[error("Relay error: {0}")]
    Relay(String),

    /// User directory lookup failed.
    #[error("User directory error: {0}")]
    UserDirectory(String),

    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected condition (unknown payload variant, invariant breach).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Returns the protocol error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            SignalError::InvalidArgument(_) => 1001,
            SignalError::PermissionDenied(_) => 1002,
            SignalError::Conflict(_) => 1003,
            SignalError::RoomNotFound(_)
            | SignalError::ParticipantNotFound(_)
            | SignalError::InvitationNotFound(_)
            | SignalError::InvitationExpired(_)
            | SignalError::UserNotFound(_) => 1004,
            SignalError::Provider(_) | SignalError::Relay(_) | SignalError::UserDirectory(_) => {
                1005
            }
            SignalError::Redis(_)
            | SignalError::Database(_)
            | SignalError::Serialization(_)
            | SignalError::Internal(_) => 500,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SignalError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            SignalError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            SignalError::Conflict(_) => StatusCode::CONFLICT,
            SignalError::RoomNotFound(_)
            | SignalError::ParticipantNotFound(_)
            | SignalError::InvitationNotFound(_)
            | SignalError::InvitationExpired(_)
            | SignalError::UserNotFound(_) => StatusCode::NOT_FOUND,
            SignalError::Provider(_) | SignalError::Relay(_) | SignalError::UserDirectory(_) => {
                StatusCode::BAD_GATEWAY
            }
            SignalError::Redis(_)
            | SignalError::Database(_)
            | SignalError::Serialization(_)
            | SignalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            SignalError::InvalidArgument(msg)
            | SignalError::PermissionDenied(msg)
            | SignalError::Conflict(msg) => msg.clone(),
            SignalError::RoomNotFound(_) => "Room not found".to_string(),
            SignalError::ParticipantNotFound(_) => "Participant not found".to_string(),
            SignalError::InvitationNotFound(_) | SignalError::InvitationExpired(_) => {
                "Invitation not found".to_string()
            }
            SignalError::UserNotFound(_) => "User not found".to_string(),
            SignalError::Provider(_) => "RTC service unavailable".to_string(),
            SignalError::Relay(_) => "Message relay unavailable".to_string(),
            SignalError::UserDirectory(_) => "User directory unavailable".to_string(),
            SignalError::Redis(_)
            | SignalError::Database(_)
            | SignalError::Serialization(_)
            | SignalError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// True for the not-found family the removal verbs are allowed to swallow.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SignalError::RoomNotFound(_) | SignalError::ParticipantNotFound(_)
        )
    }

    /// Returns a bounded label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            SignalError::InvalidArgument(_) => "invalid_argument",
            SignalError::PermissionDenied(_) => "permission_denied",
            SignalError::Conflict(_) => "conflict",
            SignalError::RoomNotFound(_)
            | SignalError::ParticipantNotFound(_)
            | SignalError::InvitationNotFound(_)
            | SignalError::InvitationExpired(_)
            | SignalError::UserNotFound(_) => "not_found",
            SignalError::Provider(_) | SignalError::Relay(_) | SignalError::UserDirectory(_) => {
                "upstream"
            }
            SignalError::Redis(_)
            | SignalError::Database(_)
            | SignalError::Serialization(_)
            | SignalError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: i32,
    message: String,
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            // Log actual error server-side, return generic message to client
            tracing::error!(target: "signal.handlers", error = %self, "Request failed");
        } else {
            tracing::debug!(target: "signal.handlers", error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for SignalError {
    fn from(err: sqlx::Error) -> Self {
        SignalError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for SignalError {
    fn from(err: redis::RedisError) -> Self {
        SignalError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for SignalError {
    fn from(err: serde_json::Error) -> Self {
        SignalError::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            SignalError::InvalidArgument("empty".to_string()).error_code(),
            1001
        );
        assert_eq!(
            SignalError::PermissionDenied("not inviter".to_string()).error_code(),
            1002
        );
        assert_eq!(SignalError::Conflict("handled".to_string()).error_code(), 1003);
        assert_eq!(SignalError::RoomNotFound("r1".to_string()).error_code(), 1004);
        assert_eq!(
            SignalError::InvitationExpired("r1".to_string()).error_code(),
            1004
        );
        assert_eq!(SignalError::Provider("503".to_string()).error_code(), 1005);
        assert_eq!(SignalError::Redis("down".to_string()).error_code(), 500);
        assert_eq!(SignalError::Internal("x".to_string()).error_code(), 500);
    }

    #[test]
    fn test_expired_and_not_found_render_the_same() {
        let expired = SignalError::InvitationExpired("SIGNAL:r1".to_string());
        let missing = SignalError::InvitationNotFound("sid-1".to_string());

        assert_eq!(expired.status_code(), missing.status_code());
        assert_eq!(expired.client_message(), missing.client_message());
        // Internally they stay distinguishable
        assert!(matches!(expired, SignalError::InvitationExpired(_)));
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let redis_err = SignalError::Redis("connection refused at 10.0.0.7:6379".to_string());
        assert!(!redis_err.client_message().contains("10.0.0.7"));

        let provider_err = SignalError::Provider("401 invalid api key lk_abc".to_string());
        assert!(!provider_err.client_message().contains("lk_abc"));
    }

    #[test]
    fn test_is_not_found_covers_provider_removals_only() {
        assert!(SignalError::RoomNotFound("r1".to_string()).is_not_found());
        assert!(SignalError::ParticipantNotFound("u1".to_string()).is_not_found());
        assert!(!SignalError::InvitationExpired("r1".to_string()).is_not_found());
        assert!(!SignalError::Provider("timeout".to_string()).is_not_found());
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            SignalError::RoomNotFound("r1".to_string()).to_string(),
            "Room not found: r1"
        );
        assert_eq!(
            SignalError::InvalidArgument("invitee user id list is empty".to_string()).to_string(),
            "Invalid argument: invitee user id list is empty"
        );
    }

    #[tokio::test]
    async fn test_into_response_body_shape() {
        let response = SignalError::PermissionDenied("only the inviter may cancel".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], 1002);
        assert_eq!(json["error"]["message"], "only the inviter may cancel");
    }
}
