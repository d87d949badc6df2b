//! HTTP clients for the user directory and the messaging relay.
//!
//! Both peers speak the same response envelope:
//! `{"errCode": 0, "errMsg": "", "data": {...}}`. A non-zero `errCode` is a
//! failure even on HTTP 200.
//!
//! # Security
//!
//! - The optional service token travels in the `token` header and is never logged
//! - Timeouts prevent hanging connections

use crate::errors::SignalError;
use crate::models::UserInfo;
use crate::notification::MsgEnvelope;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for peer requests in seconds.
const PEER_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Resolves user profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// # Errors
    ///
    /// `SignalError::UserNotFound` if the directory has no such user.
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo, SignalError>;
}

/// Delivers envelopes to clients.
#[async_trait]
pub trait MessagingRelay: Send + Sync {
    async fn send(&self, envelope: &MsgEnvelope) -> Result<(), SignalError>;
}

#[derive(Deserialize)]
struct PeerResponse<T> {
    #[serde(rename = "errCode", default)]
    err_code: i32,
    #[serde(rename = "errMsg", default)]
    err_msg: String,
    data: Option<T>,
}

#[derive(Serialize)]
struct GetUsersInfoRequest<'a> {
    #[serde(rename = "userIDs")]
    user_ids: [&'a str; 1],
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GetUsersInfoData {
    #[serde(rename = "usersInfo")]
    users_info: Vec<UserInfo>,
}

#[derive(Serialize)]
struct SendMsgRequest<'a> {
    #[serde(rename = "msgData")]
    msg_data: &'a MsgEnvelope,
}

#[derive(Deserialize, Default)]
struct Ignored {}

/// Shared request plumbing for both peers.
#[derive(Clone)]
struct PeerClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
    target: &'static str,
}

impl PeerClient {
    fn new(
        base_url: String,
        token: Option<SecretString>,
        timeout: Duration,
        target: &'static str,
    ) -> Result<Self, SignalError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "signal.clients", error = %e, "Failed to build HTTP client");
                SignalError::Internal(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            target,
        })
    }

    /// POST `body` to `path`; maps failures through `to_error`.
    async fn post<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        to_error: fn(String) -> SignalError,
    ) -> Result<Option<Resp>, SignalError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.header("token", token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            warn!(target: "signal.clients", peer = self.target, error = %e, "Peer request failed");
            to_error(format!("{} unavailable", self.target))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "signal.clients", peer = self.target, status = %status, "Peer returned error status");
            return Err(to_error(format!("{} returned {status}", self.target)));
        }

        let parsed: PeerResponse<Resp> = response.json().await.map_err(|e| {
            error!(target: "signal.clients", peer = self.target, error = %e, "Failed to parse peer response");
            to_error(format!("{} response malformed", self.target))
        })?;

        if parsed.err_code != 0 {
            warn!(
                target: "signal.clients",
                peer = self.target,
                err_code = parsed.err_code,
                err_msg = %parsed.err_msg,
                "Peer rejected request"
            );
            return Err(to_error(format!(
                "{} error {}: {}",
                self.target, parsed.err_code, parsed.err_msg
            )));
        }

        Ok(parsed.data)
    }
}

/// `UserDirectory` over HTTP.
#[derive(Clone)]
pub struct HttpUserDirectory {
    peer: PeerClient,
}

impl HttpUserDirectory {
    /// # Errors
    ///
    /// Returns `SignalError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, token: Option<SecretString>) -> Result<Self, SignalError> {
        Self::with_timeout(base_url, token, Duration::from_secs(PEER_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: String,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, SignalError> {
        Ok(Self {
            peer: PeerClient::new(base_url, token, timeout, "user directory")?,
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo, SignalError> {
        let data: Option<GetUsersInfoData> = self
            .peer
            .post(
                "/user/get_users_info",
                &GetUsersInfoRequest { user_ids: [user_id] },
                SignalError::UserDirectory,
            )
            .await?;

        data.unwrap_or_default()
            .users_info
            .into_iter()
            .find(|user| user.user_id == user_id)
            .ok_or_else(|| SignalError::UserNotFound(user_id.to_string()))
    }
}

/// `MessagingRelay` over HTTP.
#[derive(Clone)]
pub struct HttpMessagingRelay {
    peer: PeerClient,
}

impl HttpMessagingRelay {
    /// # Errors
    ///
    /// Returns `SignalError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, token: Option<SecretString>) -> Result<Self, SignalError> {
        Self::with_timeout(base_url, token, Duration::from_secs(PEER_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: String,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, SignalError> {
        Ok(Self {
            peer: PeerClient::new(base_url, token, timeout, "messaging relay")?,
        })
    }
}

#[async_trait]
impl MessagingRelay for HttpMessagingRelay {
    #[instrument(skip_all, fields(send_id = %envelope.send_id, client_msg_id = %envelope.client_msg_id))]
    async fn send(&self, envelope: &MsgEnvelope) -> Result<(), SignalError> {
        let _: Option<Ignored> = self
            .peer
            .post(
                "/msg/send_msg",
                &SendMsgRequest {
                    msg_data: envelope,
                },
                SignalError::Relay,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_response_error_code_defaults_to_success() {
        let parsed: PeerResponse<GetUsersInfoData> =
            serde_json::from_str(r#"{"data":{"usersInfo":[{"userID":"A"}]}}"#).unwrap();
        assert_eq!(parsed.err_code, 0);
        assert_eq!(parsed.data.unwrap().users_info.len(), 1);
    }

    #[test]
    fn test_request_shapes() {
        let body = serde_json::to_value(GetUsersInfoRequest { user_ids: ["A"] }).unwrap();
        assert_eq!(body, serde_json::json!({"userIDs": ["A"]}));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let directory = HttpUserDirectory::new("http://users.test/".to_string(), None).unwrap();
        assert_eq!(directory.peer.base_url, "http://users.test");
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_a_relay_error() {
        let relay = HttpMessagingRelay::with_timeout(
            "http://127.0.0.1:1".to_string(),
            None,
            Duration::from_millis(200),
        )
        .unwrap();
        let envelope = crate::notification::NotificationAssembler::new()
            .signaling(
                crate::notification::Route::default(),
                &serde_json::json!({}),
                None,
            )
            .unwrap();
        assert!(matches!(relay.send(&envelope).await, Err(SignalError::Relay(_))));
    }
}
