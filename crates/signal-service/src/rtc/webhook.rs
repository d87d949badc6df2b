//! Provider webhook authentication and decoding.
//!
//! LiveKit signs each webhook with an HS256 JWT in the `Authorization`
//! header, issued by the API key. The token's `sha256` claim is the
//! base64 SHA-256 of the raw request body, binding the token to the body.

use crate::errors::SignalError;
use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use ring::digest::{digest, SHA256};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Webhook bodies larger than this are refused before hashing.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct WebhookClaims {
    sha256: String,
}

/// Room section of a webhook event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookRoom {
    pub sid: String,
    pub name: String,
}

/// Participant section of a webhook event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookParticipant {
    pub identity: String,
    pub name: String,
}

/// A decoded provider webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEvent {
    pub event: String,
    pub room: Option<WebhookRoom>,
    pub participant: Option<WebhookParticipant>,
}

/// Room membership change carried by a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Joined,
    Left,
}

impl WebhookEvent {
    pub fn membership_change(&self) -> Option<MembershipChange> {
        match self.event.as_str() {
            "participant_joined" => Some(MembershipChange::Joined),
            "participant_left" => Some(MembershipChange::Left),
            _ => None,
        }
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room
            .as_ref()
            .map(|room| room.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Verifies and decodes provider webhooks.
#[derive(Clone)]
pub struct WebhookReceiver {
    api_key: String,
    api_secret: SecretString,
}

impl WebhookReceiver {
    pub fn new(api_key: String, api_secret: SecretString) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Authenticate `body` against the `Authorization` header value and decode it.
    ///
    /// # Errors
    ///
    /// - `SignalError::PermissionDenied` if the token or body digest does not verify
    /// - `SignalError::InvalidArgument` if the body is oversized or not an event
    pub fn receive(&self, authorization: &str, body: &[u8]) -> Result<WebhookEvent, SignalError> {
        if body.len() > MAX_WEBHOOK_BODY_BYTES {
            return Err(SignalError::InvalidArgument(
                "webhook body too large".to_string(),
            ));
        }

        let token = authorization
            .strip_prefix("Bearer ")
            .unwrap_or(authorization)
            .trim();
        if token.is_empty() {
            return Err(SignalError::PermissionDenied(
                "missing webhook authorization".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[self.api_key.as_str()]);

        let key = DecodingKey::from_secret(self.api_secret.expose_secret().as_bytes());
        let claims = decode::<WebhookClaims>(token, &key, &validation)
            .map_err(|e| {
                debug!(target: "signal.rtc.webhook", error = %e, "Webhook token verification failed");
                SignalError::PermissionDenied("invalid webhook token".to_string())
            })?
            .claims;

        let body_digest = STANDARD.encode(digest(&SHA256, body).as_ref());
        if claims.sha256 != body_digest {
            debug!(target: "signal.rtc.webhook", "Webhook body digest mismatch");
            return Err(SignalError::PermissionDenied(
                "webhook body digest mismatch".to_string(),
            ));
        }

        serde_json::from_slice(body).map_err(|e| {
            debug!(target: "signal.rtc.webhook", error = %e, "Undecodable webhook body");
            SignalError::InvalidArgument(format!("invalid webhook body: {e}"))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "webhook-secret-webhook-secret-32";

    fn receiver() -> WebhookReceiver {
        WebhookReceiver::new("devkey".to_string(), SecretString::from(SECRET))
    }

    fn sign(issuer: &str, body: &[u8], secret: &str) -> String {
        let claims = serde_json::json!({
            "iss": issuer,
            "exp": chrono::Utc::now().timestamp() + 300,
            "sha256": STANDARD.encode(digest(&SHA256, body).as_ref()),
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    const BODY: &[u8] =
        br#"{"event":"participant_joined","room":{"sid":"RM_1","name":"g1"},"participant":{"identity":"B"}}"#;

    #[test]
    fn test_valid_webhook_decodes() {
        let token = sign("devkey", BODY, SECRET);
        let event = receiver().receive(&token, BODY).unwrap();

        assert_eq!(event.membership_change(), Some(MembershipChange::Joined));
        assert_eq!(event.room_name(), Some("g1"));
        assert_eq!(event.participant.unwrap().identity, "B");
    }

    #[test]
    fn test_bearer_prefix_is_accepted() {
        let token = sign("devkey", BODY, SECRET);
        assert!(receiver().receive(&format!("Bearer {token}"), BODY).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let token = sign("devkey", BODY, SECRET);
        let tampered = br#"{"event":"participant_left","room":{"name":"g1"}}"#;
        assert!(matches!(
            receiver().receive(&token, tampered),
            Err(SignalError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_wrong_secret_or_issuer_is_rejected() {
        let wrong_secret = sign("devkey", BODY, "another-secret-another-secret-32");
        assert!(matches!(
            receiver().receive(&wrong_secret, BODY),
            Err(SignalError::PermissionDenied(_))
        ));

        let wrong_issuer = sign("otherkey", BODY, SECRET);
        assert!(matches!(
            receiver().receive(&wrong_issuer, BODY),
            Err(SignalError::PermissionDenied(_))
        ));

        assert!(matches!(
            receiver().receive("", BODY),
            Err(SignalError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_other_events_carry_no_membership_change() {
        let event = WebhookEvent {
            event: "room_finished".to_string(),
            ..Default::default()
        };
        assert_eq!(event.membership_change(), None);
        assert_eq!(event.room_name(), None);
    }
}
