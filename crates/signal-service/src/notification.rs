//! Notification envelopes for the messaging relay.
//!
//! Every envelope carries the fixed delivery options below. Clients key
//! their rendering off these flags, so the set must not change.

use crate::errors::SignalError;
use crate::models::{InvitationInfo, OfflinePushInfo, ParticipantMetadata, SessionType};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Envelope originates from a user.
pub const MSG_FROM_USER: i32 = 100;

/// Content type of a signaling payload.
pub const CONTENT_TYPE_SIGNALING: i32 = 1601;

/// Content type announcing that the group room's roster grew.
pub const CONTENT_TYPE_ROOM_PARTICIPANTS_CONNECTED: i32 = 1702;

/// Content type announcing that the group room's roster shrank.
pub const CONTENT_TYPE_ROOM_PARTICIPANTS_DISCONNECTED: i32 = 1703;

/// Delivery options stamped on every envelope.
pub const ENVELOPE_OPTIONS: [(&str, bool); 9] = [
    ("history", false),
    ("persistent", false),
    ("senderSync", true),
    ("conversationUpdate", false),
    ("senderConversationUpdate", false),
    ("unreadCount", true),
    ("offlinePush", true),
    ("notNotification", false),
    ("sendMsg", false),
];

/// Relay message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgEnvelope {
    #[serde(rename = "sendID")]
    pub send_id: String,
    #[serde(rename = "recvID")]
    pub recv_id: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    #[serde(rename = "senderPlatformID")]
    pub sender_platform_id: i32,
    #[serde(rename = "sessionType")]
    pub session_type: i32,
    #[serde(rename = "msgFrom")]
    pub msg_from: i32,
    #[serde(rename = "contentType")]
    pub content_type: i32,
    /// Serialized payload; opaque to the relay.
    pub content: String,
    /// Nanoseconds since the Unix epoch.
    #[serde(rename = "createTime")]
    pub create_time: i64,
    pub options: BTreeMap<String, bool>,
    #[serde(rename = "offlinePushInfo", skip_serializing_if = "Option::is_none")]
    pub offline_push_info: Option<OfflinePushInfo>,
}

/// Routing for one envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub send_id: String,
    pub recv_id: String,
    pub group_id: String,
    pub session_type: SessionType,
    pub platform_id: i32,
}

impl Route {
    /// Point-to-point delivery.
    pub fn direct(send_id: &str, recv_id: &str, invitation: &InvitationInfo) -> Self {
        Self {
            send_id: send_id.to_string(),
            recv_id: recv_id.to_string(),
            group_id: invitation.group_id.clone(),
            session_type: invitation.session_type,
            platform_id: invitation.platform_id,
        }
    }

    /// Fan-out to the invitation's group.
    pub fn group(send_id: &str, invitation: &InvitationInfo) -> Self {
        Self {
            send_id: send_id.to_string(),
            recv_id: String::new(),
            group_id: invitation.group_id.clone(),
            session_type: invitation.session_type,
            platform_id: invitation.platform_id,
        }
    }
}

/// Payload of a group room membership notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomParticipantsPayload {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "participant")]
    pub participants: Vec<ParticipantMetadata>,
    pub invitation: InvitationInfo,
}

/// Builds relay envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationAssembler;

impl NotificationAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Envelope carrying a signaling payload.
    pub fn signaling<T: Serialize>(
        &self,
        route: Route,
        payload: &T,
        offline_push_info: Option<OfflinePushInfo>,
    ) -> Result<MsgEnvelope, SignalError> {
        self.build(route, CONTENT_TYPE_SIGNALING, payload, offline_push_info)
    }

    /// Group membership envelope, sent on behalf of the inviter to the whole group.
    pub fn room_participants(
        &self,
        invitation: &InvitationInfo,
        participants: Vec<ParticipantMetadata>,
        connected: bool,
    ) -> Result<MsgEnvelope, SignalError> {
        let route = Route {
            send_id: invitation.inviter_user_id.clone(),
            recv_id: String::new(),
            group_id: invitation.group_id.clone(),
            session_type: SessionType::SuperGroup,
            platform_id: invitation.platform_id,
        };
        let content_type = if connected {
            CONTENT_TYPE_ROOM_PARTICIPANTS_CONNECTED
        } else {
            CONTENT_TYPE_ROOM_PARTICIPANTS_DISCONNECTED
        };
        let payload = RoomParticipantsPayload {
            group_id: invitation.group_id.clone(),
            participants,
            invitation: invitation.clone(),
        };
        self.build(route, content_type, &payload, None)
    }

    fn build<T: Serialize>(
        &self,
        route: Route,
        content_type: i32,
        payload: &T,
        offline_push_info: Option<OfflinePushInfo>,
    ) -> Result<MsgEnvelope, SignalError> {
        let content = serde_json::to_string(payload)?;
        let create_time = now_nanos();
        let client_msg_id = client_msg_id(&route.send_id, create_time);

        debug!(
            target: "signal.notification",
            send_id = %route.send_id,
            recv_id = %route.recv_id,
            group_id = %route.group_id,
            content_type,
            "Assembled envelope"
        );

        Ok(MsgEnvelope {
            send_id: route.send_id,
            recv_id: route.recv_id,
            group_id: route.group_id,
            client_msg_id,
            sender_platform_id: route.platform_id,
            session_type: route.session_type.as_i32(),
            msg_from: MSG_FROM_USER,
            content_type,
            content,
            create_time,
            options: envelope_options(),
            offline_push_info,
        })
    }
}

/// The fixed option map.
pub fn envelope_options() -> BTreeMap<String, bool> {
    ENVELOPE_OPTIONS
        .iter()
        .map(|(key, value)| ((*key).to_string(), *value))
        .collect()
}

/// Hex MD5 of `{sendID}-{nanos}-{random u64}`.
pub fn client_msg_id(send_id: &str, nanos: i64) -> String {
    let salt: u64 = rand::thread_rng().gen();
    format!("{:x}", md5::compute(format!("{send_id}-{nanos}-{salt}")))
}

fn now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{InviteRequest, SignalRequest};

    fn invitation() -> InvitationInfo {
        InvitationInfo {
            inviter_user_id: "A".to_string(),
            invitee_user_ids: vec!["B".to_string()],
            room_id: "r1".to_string(),
            platform_id: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_options_are_fixed() {
        let options = envelope_options();
        assert_eq!(options.len(), 9);
        assert_eq!(options.get("history"), Some(&false));
        assert_eq!(options.get("persistent"), Some(&false));
        assert_eq!(options.get("senderSync"), Some(&true));
        assert_eq!(options.get("conversationUpdate"), Some(&false));
        assert_eq!(options.get("senderConversationUpdate"), Some(&false));
        assert_eq!(options.get("unreadCount"), Some(&true));
        assert_eq!(options.get("offlinePush"), Some(&true));
        assert_eq!(options.get("notNotification"), Some(&false));
        assert_eq!(options.get("sendMsg"), Some(&false));
    }

    #[test]
    fn test_signaling_envelope_routes_and_embeds_payload() {
        let invitation = invitation();
        let request = SignalRequest::Invite(InviteRequest {
            invitation: invitation.clone(),
            offline_push_info: None,
        });
        let push = OfflinePushInfo {
            title: "Call".to_string(),
            ..Default::default()
        };

        let envelope = NotificationAssembler::new()
            .signaling(Route::direct("A", "B", &invitation), &request, Some(push.clone()))
            .unwrap();

        assert_eq!(envelope.send_id, "A");
        assert_eq!(envelope.recv_id, "B");
        assert!(envelope.group_id.is_empty());
        assert_eq!(envelope.msg_from, MSG_FROM_USER);
        assert_eq!(envelope.content_type, CONTENT_TYPE_SIGNALING);
        assert_eq!(envelope.session_type, 1);
        assert_eq!(envelope.sender_platform_id, 2);
        assert_eq!(envelope.offline_push_info, Some(push));
        assert_eq!(envelope.client_msg_id.len(), 32);
        assert!(envelope.create_time > 1_000_000_000_000_000_000);

        let decoded: SignalRequest = serde_json::from_str(&envelope.content).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_group_route_has_no_recipient() {
        let mut invitation = invitation();
        invitation.group_id = "g1".to_string();
        invitation.session_type = SessionType::Group;

        let route = Route::group("A", &invitation);
        assert!(route.recv_id.is_empty());
        assert_eq!(route.group_id, "g1");
        assert_eq!(route.session_type, SessionType::Group);
    }

    #[test]
    fn test_room_participants_envelope() {
        let mut invitation = invitation();
        invitation.group_id = "g1".to_string();
        let participants = vec![ParticipantMetadata {
            user_id: "B".to_string(),
            ..Default::default()
        }];

        let joined = NotificationAssembler::new()
            .room_participants(&invitation, participants.clone(), true)
            .unwrap();
        assert_eq!(joined.content_type, CONTENT_TYPE_ROOM_PARTICIPANTS_CONNECTED);
        assert_eq!(joined.session_type, SessionType::SuperGroup.as_i32());
        assert_eq!(joined.send_id, "A");
        assert!(joined.recv_id.is_empty());
        assert_eq!(joined.group_id, "g1");

        let payload: RoomParticipantsPayload = serde_json::from_str(&joined.content).unwrap();
        assert_eq!(payload.participants, participants);

        let left = NotificationAssembler::new()
            .room_participants(&invitation, participants, false)
            .unwrap();
        assert_eq!(left.content_type, CONTENT_TYPE_ROOM_PARTICIPANTS_DISCONNECTED);
    }

    #[test]
    fn test_client_msg_ids_are_unique_hex() {
        let a = client_msg_id("A", 1);
        let b = client_msg_id("A", 1);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
