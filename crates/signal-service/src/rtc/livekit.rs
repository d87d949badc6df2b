//! LiveKit room provider.
//!
//! Talks to the LiveKit server API over its Twirp JSON transport
//! (`POST {api}/twirp/livekit.RoomService/{Method}`). Every call is
//! authorized with a short-lived HS256 service token signed with the API
//! secret; participant access tokens are minted locally with the same key.
//!
//! # Security
//!
//! - The API secret is held in a `SecretString` and never logged
//! - Participant tokens are scoped to exactly one room

use crate::errors::SignalError;
use crate::observability::metrics;
use crate::rtc::{RoomProvider, RtcParticipant, RtcRoom};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};

const ROOM_SERVICE_PATH: &str = "/twirp/livekit.RoomService";

/// Lifetime of the token attached to each server API call.
const SERVICE_TOKEN_TTL_SECONDS: i64 = 600;

/// Default timeout for provider requests in seconds.
const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Connection settings for a LiveKit deployment.
#[derive(Clone)]
pub struct LiveKitSettings {
    /// Server API base URL, without trailing slash.
    pub api_url: String,
    /// URL handed to clients for the media connection.
    pub live_url: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub empty_room_timeout_seconds: u32,
}

/// Video grant embedded in LiveKit access tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_create: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_list: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_admin: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,
}

/// LiveKit access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

// Twirp request and response bodies.

#[derive(Serialize)]
struct ListRoomsRequest<'a> {
    names: &'a [String],
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ListRoomsResponse {
    rooms: Vec<LiveKitRoom>,
}

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    empty_timeout: u32,
    metadata: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LiveKitRoom {
    sid: String,
    name: String,
    metadata: String,
    #[serde(alias = "numParticipants")]
    num_participants: u32,
}

#[derive(Serialize)]
struct RoomRequest<'a> {
    room: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ListParticipantsResponse {
    participants: Vec<LiveKitParticipant>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LiveKitParticipant {
    identity: String,
    name: String,
    metadata: String,
}

#[derive(Serialize)]
struct RemoveParticipantRequest<'a> {
    room: &'a str,
    identity: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Empty {}

impl From<LiveKitRoom> for RtcRoom {
    fn from(room: LiveKitRoom) -> Self {
        Self {
            sid: room.sid,
            name: room.name,
            metadata: room.metadata,
            num_participants: room.num_participants,
        }
    }
}

impl From<LiveKitParticipant> for RtcParticipant {
    fn from(participant: LiveKitParticipant) -> Self {
        Self {
            identity: participant.identity,
            name: participant.name,
            metadata: participant.metadata,
        }
    }
}

/// What a 404 from a Twirp method means.
#[derive(Clone, Copy)]
enum NotFound {
    Room,
    Participant,
}

/// `RoomProvider` backed by a LiveKit server.
#[derive(Clone)]
pub struct LiveKitRoomProvider {
    client: Client,
    settings: LiveKitSettings,
}

impl LiveKitRoomProvider {
    /// # Errors
    ///
    /// Returns `SignalError::Internal` if the HTTP client cannot be built.
    pub fn new(settings: LiveKitSettings) -> Result<Self, SignalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "signal.rtc.livekit", error = %e, "Failed to build HTTP client");
                SignalError::Internal(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, settings })
    }

    fn sign(&self, claims: &AccessClaims) -> Result<String, SignalError> {
        let key = EncodingKey::from_secret(self.settings.api_secret.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key).map_err(|e| {
            error!(target: "signal.rtc.livekit", error = %e, "Failed to sign access token");
            SignalError::Internal(format!("Failed to sign access token: {e}"))
        })
    }

    fn service_token(&self, room: Option<&str>) -> Result<String, SignalError> {
        let now = chrono::Utc::now().timestamp();
        self.sign(&AccessClaims {
            iss: self.settings.api_key.clone(),
            sub: String::new(),
            name: String::new(),
            metadata: String::new(),
            nbf: now,
            exp: now + SERVICE_TOKEN_TTL_SECONDS,
            video: VideoGrant {
                room_create: true,
                room_list: true,
                room_admin: true,
                room: room.unwrap_or_default().to_string(),
                ..Default::default()
            },
        })
    }

    async fn call<Req, Resp>(
        &self,
        operation: &'static str,
        method: &str,
        room: Option<&str>,
        body: &Req,
        not_found: NotFound,
    ) -> Result<Resp, SignalError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Default,
    {
        let start = Instant::now();
        let result = self.send(method, room, body, not_found).await;
        let status = match &result {
            Ok(_) => "success",
            Err(e) if e.is_not_found() => "not_found",
            Err(_) => "error",
        };
        metrics::record_provider_call(operation, status, start.elapsed());
        result
    }

    async fn send<Req, Resp>(
        &self,
        method: &str,
        room: Option<&str>,
        body: &Req,
        not_found: NotFound,
    ) -> Result<Resp, SignalError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Default,
    {
        let url = format!("{}{ROOM_SERVICE_PATH}/{method}", self.settings.api_url);
        let token = self.service_token(room)?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "signal.rtc.livekit", error = %e, method = %method, "Provider request failed");
                SignalError::Provider(format!("{method} request failed: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await.map_err(|e| {
                warn!(target: "signal.rtc.livekit", error = %e, method = %method, "Failed to read provider response");
                SignalError::Provider(format!("{method} response unreadable: {e}"))
            })?;
            if bytes.is_empty() {
                return Ok(Resp::default());
            }
            return serde_json::from_slice(&bytes).map_err(|e| {
                error!(target: "signal.rtc.livekit", error = %e, method = %method, "Failed to parse provider response");
                SignalError::Provider(format!("{method} response malformed: {e}"))
            });
        }

        if status == StatusCode::NOT_FOUND {
            let subject = room.unwrap_or_default().to_string();
            return Err(match not_found {
                NotFound::Room => SignalError::RoomNotFound(subject),
                NotFound::Participant => SignalError::ParticipantNotFound(subject),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            error!(target: "signal.rtc.livekit", method = %method, "Provider rejected API credentials");
        } else {
            warn!(target: "signal.rtc.livekit", status = %status, body = %body, method = %method, "Provider returned error");
        }
        Err(SignalError::Provider(format!("{method} returned {status}")))
    }
}

#[async_trait]
impl RoomProvider for LiveKitRoomProvider {
    #[instrument(skip_all, fields(names = names.len()))]
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<RtcRoom>, SignalError> {
        let response: ListRoomsResponse = self
            .call("list_rooms", "ListRooms", None, &ListRoomsRequest { names }, NotFound::Room)
            .await?;
        Ok(response.rooms.into_iter().map(RtcRoom::from).collect())
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn create_room(&self, room_id: &str, metadata: &str) -> Result<RtcRoom, SignalError> {
        let request = CreateRoomRequest {
            name: room_id,
            empty_timeout: self.settings.empty_room_timeout_seconds,
            metadata,
        };
        let room: LiveKitRoom = self
            .call("create_room", "CreateRoom", Some(room_id), &request, NotFound::Room)
            .await?;
        if room.sid.is_empty() {
            return Err(SignalError::Provider(format!(
                "CreateRoom returned no sid for {room_id}"
            )));
        }
        Ok(room.into())
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn list_participants(&self, room_id: &str) -> Result<Vec<RtcParticipant>, SignalError> {
        let response: ListParticipantsResponse = self
            .call(
                "list_participants",
                "ListParticipants",
                Some(room_id),
                &RoomRequest { room: room_id },
                NotFound::Room,
            )
            .await?;
        Ok(response
            .participants
            .into_iter()
            .map(RtcParticipant::from)
            .collect())
    }

    #[instrument(skip_all, fields(room_id = %room_id, identity = %identity))]
    async fn remove_participant(&self, room_id: &str, identity: &str) -> Result<(), SignalError> {
        let _: Empty = self
            .call(
                "remove_participant",
                "RemoveParticipant",
                Some(room_id),
                &RemoveParticipantRequest {
                    room: room_id,
                    identity,
                },
                NotFound::Participant,
            )
            .await?;
        Ok(())
    }

    fn issue_token(
        &self,
        room_id: &str,
        identity: &str,
        name: &str,
        metadata: &str,
    ) -> Result<String, SignalError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.settings.token_ttl_seconds).unwrap_or(i64::MAX / 2);
        self.sign(&AccessClaims {
            iss: self.settings.api_key.clone(),
            sub: identity.to_string(),
            name: name.to_string(),
            metadata: metadata.to_string(),
            nbf: now,
            exp: now.saturating_add(ttl),
            video: VideoGrant {
                room_join: true,
                room: room_id.to_string(),
                ..Default::default()
            },
        })
    }

    fn live_url(&self) -> String {
        self.settings.live_url.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn provider() -> LiveKitRoomProvider {
        LiveKitRoomProvider::new(LiveKitSettings {
            api_url: "http://127.0.0.1:1".to_string(),
            live_url: "wss://live.test".to_string(),
            api_key: "devkey".to_string(),
            api_secret: SecretString::from("devsecret-devsecret-devsecret-32"),
            token_ttl_seconds: 3600,
            empty_room_timeout_seconds: 300,
        })
        .unwrap()
    }

    fn verify(token: &str) -> AccessClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&["devkey"]);
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(b"devsecret-devsecret-devsecret-32"),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn test_participant_token_is_scoped_to_one_room() {
        let token = provider()
            .issue_token("r1", "B", "Bob", "{\"userID\":\"B\"}")
            .unwrap();
        let claims = verify(&token);

        assert_eq!(claims.sub, "B");
        assert_eq!(claims.name, "Bob");
        assert_eq!(claims.metadata, "{\"userID\":\"B\"}");
        assert!(claims.video.room_join);
        assert!(!claims.video.room_admin);
        assert_eq!(claims.video.room, "r1");
        assert_eq!(claims.exp - claims.nbf, 3600);
    }

    #[test]
    fn test_service_token_grants_admin() {
        let token = provider().service_token(Some("r1")).unwrap();
        let claims = verify(&token);

        assert!(claims.video.room_create);
        assert!(claims.video.room_list);
        assert!(claims.video.room_admin);
        assert!(!claims.video.room_join);
        assert!(claims.sub.is_empty());
    }

    #[test]
    fn test_video_grant_omits_false_flags() {
        let grant = VideoGrant {
            room_join: true,
            room: "r1".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(value, serde_json::json!({"roomJoin": true, "room": "r1"}));
    }

    #[test]
    fn test_room_response_accepts_both_field_spellings() {
        let snake: LiveKitRoom =
            serde_json::from_str(r#"{"sid":"RM_1","name":"r1","num_participants":2}"#).unwrap();
        let camel: LiveKitRoom =
            serde_json::from_str(r#"{"sid":"RM_1","name":"r1","numParticipants":2}"#).unwrap();
        assert_eq!(snake.num_participants, 2);
        assert_eq!(camel.num_participants, 2);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_a_provider_error() {
        let result = provider().list_rooms(&[]).await;
        assert!(matches!(result, Err(SignalError::Provider(_))));
    }
}
