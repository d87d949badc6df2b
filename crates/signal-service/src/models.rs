//! Signal service data models.
//!
//! Wire types use the camelCase field names clients already speak
//! (`inviterUserID`, `roomID`, ...). Durable and cache types are internal
//! and keep snake_case.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversation type carried by an invitation and its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SessionType {
    /// 1:1 call.
    #[default]
    Single,
    /// Ordinary group.
    Group,
    /// Large group; membership notifications go here.
    SuperGroup,
}

impl SessionType {
    pub fn as_i32(self) -> i32 {
        match self {
            SessionType::Single => 1,
            SessionType::Group => 2,
            SessionType::SuperGroup => 3,
        }
    }

    pub fn is_single(self) -> bool {
        matches!(self, SessionType::Single)
    }
}

impl TryFrom<i32> for SessionType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SessionType::Single),
            2 => Ok(SessionType::Group),
            3 => Ok(SessionType::SuperGroup),
            other => Err(format!("unknown session type {other}")),
        }
    }
}

impl From<SessionType> for i32 {
    fn from(value: SessionType) -> Self {
        value.as_i32()
    }
}

/// Media requested by the inviter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Audio,
    Video,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            other => Err(format!("unknown media type {other}")),
        }
    }
}

/// Per-invitee status. Everything except `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteeStatus {
    Pending,
    Accepted,
    Rejected,
    HungUp,
    Cancelled,
}

impl InviteeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InviteeStatus::Pending => "pending",
            InviteeStatus::Accepted => "accepted",
            InviteeStatus::Rejected => "rejected",
            InviteeStatus::HungUp => "hung_up",
            InviteeStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, InviteeStatus::Pending)
    }
}

impl fmt::Display for InviteeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteeStatus::Pending),
            "accepted" => Ok(InviteeStatus::Accepted),
            "rejected" => Ok(InviteeStatus::Rejected),
            "hung_up" => Ok(InviteeStatus::HungUp),
            "cancelled" => Ok(InviteeStatus::Cancelled),
            other => Err(format!("unknown invitee status {other}")),
        }
    }
}

/// Push display hints forwarded to offline devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflinePushInfo {
    pub title: String,
    pub desc: String,
    pub ex: String,
    #[serde(rename = "iOSPushSound")]
    pub ios_push_sound: String,
    #[serde(rename = "iOSBadgeCount")]
    pub ios_badge_count: bool,
    #[serde(rename = "signalInfo")]
    pub signal_info: String,
}

/// The invitation as clients see it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationInfo {
    #[serde(rename = "inviterUserID")]
    pub inviter_user_id: String,
    #[serde(rename = "inviteeUserIDList")]
    pub invitee_user_ids: Vec<String>,
    #[serde(rename = "customData")]
    pub custom_data: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "roomID")]
    pub room_id: String,
    /// Seconds; non-positive means "use the service default".
    pub timeout: i32,
    #[serde(rename = "mediaType")]
    pub media_type: MediaType,
    #[serde(rename = "platformID")]
    pub platform_id: i32,
    #[serde(rename = "sessionType")]
    pub session_type: SessionType,
    /// Unix seconds.
    #[serde(rename = "initiateTime")]
    pub initiate_time: i64,
    #[serde(rename = "busyLineUserIDList")]
    pub busy_line_user_ids: Vec<String>,
}

/// Durable invitation header, one per RTC room session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationHeader {
    pub sid: String,
    pub room_id: String,
    pub inviter_user_id: String,
    pub custom_data: String,
    pub group_id: String,
    pub media_type: MediaType,
    pub platform_id: i32,
    pub session_type: SessionType,
    pub timeout_seconds: i32,
    pub initiate_time: DateTime<Utc>,
    #[serde(default)]
    pub push: OfflinePushInfo,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl InvitationHeader {
    /// Build a header from an invitation once the provider has assigned `sid`.
    pub fn from_invitation(
        invitation: &InvitationInfo,
        push: Option<&OfflinePushInfo>,
        sid: &str,
    ) -> Self {
        let initiate_time = if invitation.initiate_time > 0 {
            Utc.timestamp_opt(invitation.initiate_time, 0)
                .single()
                .unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        Self {
            sid: sid.to_string(),
            room_id: invitation.room_id.clone(),
            inviter_user_id: invitation.inviter_user_id.clone(),
            custom_data: invitation.custom_data.clone(),
            group_id: invitation.group_id.clone(),
            media_type: invitation.media_type,
            platform_id: invitation.platform_id,
            session_type: invitation.session_type,
            timeout_seconds: invitation.timeout,
            initiate_time,
            push: push.cloned().unwrap_or_default(),
            file_url: None,
            end_time: None,
        }
    }

    /// Rebuild the client-facing invitation. Busy-line data is not persisted.
    pub fn to_invitation(&self, invitee_user_ids: Vec<String>) -> InvitationInfo {
        InvitationInfo {
            inviter_user_id: self.inviter_user_id.clone(),
            invitee_user_ids,
            custom_data: self.custom_data.clone(),
            group_id: self.group_id.clone(),
            room_id: self.room_id.clone(),
            timeout: self.timeout_seconds,
            media_type: self.media_type,
            platform_id: self.platform_id,
            session_type: self.session_type,
            initiate_time: self.initiate_time.timestamp(),
            busy_line_user_ids: Vec::new(),
        }
    }
}

/// Denormalized room entry kept under `SIGNAL:{roomID}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub header: InvitationHeader,
    #[serde(rename = "inviteeUserIDList", default)]
    pub invitee_user_ids: Vec<String>,
}

impl CacheEntry {
    pub fn to_invitation(&self) -> InvitationInfo {
        self.header.to_invitation(self.invitee_user_ids.clone())
    }
}

/// Durable per-user status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteeRow {
    pub sid: String,
    pub user_id: String,
    pub status: InviteeStatus,
    pub initiate_time: DateTime<Utc>,
    /// Unix epoch until the row is handled.
    pub handle_time: DateTime<Utc>,
}

impl InviteeRow {
    pub fn is_handled(&self) -> bool {
        self.handle_time.timestamp() != 0
    }
}

/// Outcome of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Row moved from Pending to the requested status.
    Transitioned,
    /// Row was already terminal; it was left untouched.
    AlreadyHandled(InviteeStatus),
    /// No row for `(sid, user_id)`.
    Missing,
}

/// A header together with every status row under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalRecord {
    pub header: InvitationHeader,
    pub invitees: Vec<InviteeRow>,
}

/// Result of writing an invitation to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSignalOutcome {
    /// Invitees that already had an unacknowledged invitation.
    pub unhandled_user_ids: Vec<String>,
}

/// 1-based pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    #[serde(rename = "pageNumber")]
    pub page_number: u32,
    #[serde(rename = "showNumber")]
    pub show_number: u32,
}

/// Upper bound on rows per page.
pub const MAX_PAGE_SIZE: u32 = 1000;

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_number: 1,
            show_number: 20,
        }
    }
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        i64::from(self.show_number.clamp(1, MAX_PAGE_SIZE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page_number.max(1) - 1) * self.limit()
    }
}

/// History query filter. Zero/empty fields are not applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub session_type: Option<SessionType>,
    pub send_id: String,
    pub recv_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// User as returned by the user directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub nickname: String,
    pub account: String,
}

/// Snapshot embedded in RTC participant metadata at invite or join time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantMetadata {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub nickname: String,
    pub account: String,
}

impl From<UserInfo> for ParticipantMetadata {
    fn from(user: UserInfo) -> Self {
        Self {
            user_id: user.user_id,
            nickname: user.nickname,
            account: user.account,
        }
    }
}

// ============================================================================
// Meeting metadata embedded in group rooms
// ============================================================================

/// Room metadata for group calls. A 1:1 room carries the empty default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingMetadata {
    pub detail: MeetingDetail,
    #[serde(rename = "personalData")]
    pub personal_data: Vec<PersonalData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingDetail {
    pub info: MeetingInfo,
    pub setting: MeetingSetting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingInfo {
    #[serde(rename = "systemGenerated")]
    pub system_generated: SystemGeneratedMeetingInfo,
    #[serde(rename = "creatorDefinedMeeting")]
    pub creator_defined: CreatorDefinedMeetingInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemGeneratedMeetingInfo {
    #[serde(rename = "creatorUserID")]
    pub creator_user_id: String,
    #[serde(rename = "creatorNickname")]
    pub creator_nickname: String,
    pub status: String,
    /// Unix seconds.
    #[serde(rename = "startTime")]
    pub start_time: i64,
    #[serde(rename = "meetingID")]
    pub meeting_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatorDefinedMeetingInfo {
    #[serde(rename = "hostUserID")]
    pub host_user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingSetting {
    #[serde(rename = "disableCameraOnJoin")]
    pub disable_camera_on_join: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalData {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "personalSetting")]
    pub personal_setting: PersonalMeetingSetting,
    #[serde(rename = "limitSetting")]
    pub limit_setting: PersonalMeetingSetting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalMeetingSetting {
    #[serde(rename = "cameraOnEntry")]
    pub camera_on_entry: bool,
    #[serde(rename = "microphoneOnEntry")]
    pub microphone_on_entry: bool,
}

/// Meeting status written into group room metadata.
pub const MEETING_STATUS_IN_PROGRESS: &str = "in_progress";

impl MeetingMetadata {
    /// Metadata for a group call started by `creator`.
    pub fn for_group_call(
        group_id: &str,
        creator: &UserInfo,
        media_type: MediaType,
        start_time: i64,
    ) -> Self {
        Self {
            detail: MeetingDetail {
                info: MeetingInfo {
                    system_generated: SystemGeneratedMeetingInfo {
                        creator_user_id: creator.user_id.clone(),
                        creator_nickname: creator.nickname.clone(),
                        status: MEETING_STATUS_IN_PROGRESS.to_string(),
                        start_time,
                        meeting_id: group_id.to_string(),
                    },
                    creator_defined: CreatorDefinedMeetingInfo {
                        host_user_id: creator.user_id.clone(),
                    },
                },
                setting: MeetingSetting {
                    disable_camera_on_join: media_type != MediaType::Video,
                },
            },
            personal_data: vec![PersonalData {
                user_id: creator.user_id.clone(),
                personal_setting: PersonalMeetingSetting {
                    camera_on_entry: false,
                    microphone_on_entry: false,
                },
                limit_setting: PersonalMeetingSetting {
                    camera_on_entry: true,
                    microphone_on_entry: true,
                },
            }],
        }
    }

    /// Media type implied by the room settings.
    pub fn media_type(&self) -> MediaType {
        if self.detail.setting.disable_camera_on_join {
            MediaType::Audio
        } else {
            MediaType::Video
        }
    }
}

// ============================================================================
// Verb requests and responses
// ============================================================================

/// Invite or InviteInGroup payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteRequest {
    pub invitation: InvitationInfo,
    #[serde(rename = "offlinePushInfo", skip_serializing_if = "Option::is_none")]
    pub offline_push_info: Option<OfflinePushInfo>,
}

/// Cancel, Accept, Reject or HungUp payload. `user_id` is the acting user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalActionRequest {
    pub invitation: InvitationInfo,
    #[serde(rename = "offlinePushInfo", skip_serializing_if = "Option::is_none")]
    pub offline_push_info: Option<OfflinePushInfo>,
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetTokenByRoomIdRequest {
    #[serde(rename = "roomID")]
    pub room_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// Closed set of signaling verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalRequest {
    #[serde(rename = "invite")]
    Invite(InviteRequest),
    #[serde(rename = "inviteInGroup")]
    InviteInGroup(InviteRequest),
    #[serde(rename = "cancel")]
    Cancel(SignalActionRequest),
    #[serde(rename = "accept")]
    Accept(SignalActionRequest),
    #[serde(rename = "hungUp")]
    HungUp(SignalActionRequest),
    #[serde(rename = "reject")]
    Reject(SignalActionRequest),
    #[serde(rename = "getTokenByRoomID")]
    GetTokenByRoomId(GetTokenByRoomIdRequest),
}

impl SignalRequest {
    /// Bounded verb label for logs and metrics.
    pub fn verb(&self) -> &'static str {
        match self {
            SignalRequest::Invite(_) => "invite",
            SignalRequest::InviteInGroup(_) => "invite_in_group",
            SignalRequest::Cancel(_) => "cancel",
            SignalRequest::Accept(_) => "accept",
            SignalRequest::HungUp(_) => "hung_up",
            SignalRequest::Reject(_) => "reject",
            SignalRequest::GetTokenByRoomId(_) => "get_token_by_room_id",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteResponse {
    pub token: String,
    #[serde(rename = "roomID")]
    pub room_id: String,
    #[serde(rename = "liveURL")]
    pub live_url: String,
    #[serde(rename = "busyLineUserIDList")]
    pub busy_line_user_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub token: String,
    #[serde(rename = "roomID")]
    pub room_id: String,
    #[serde(rename = "liveURL")]
    pub live_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "liveURL")]
    pub live_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalResponse {
    #[serde(rename = "invite")]
    Invite(InviteResponse),
    #[serde(rename = "inviteInGroup")]
    InviteInGroup(InviteResponse),
    #[serde(rename = "cancel")]
    Cancel(EmptyResponse),
    #[serde(rename = "accept")]
    Accept(AcceptResponse),
    #[serde(rename = "hungUp")]
    HungUp(EmptyResponse),
    #[serde(rename = "reject")]
    Reject(EmptyResponse),
    #[serde(rename = "getTokenByRoomID")]
    GetTokenByRoomId(TokenResponse),
}

/// Cached invitation lookup result. Both fields are absent on a start-app miss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationLookupResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation: Option<InvitationInfo>,
    #[serde(rename = "offlinePushInfo", skip_serializing_if = "Option::is_none")]
    pub offline_push_info: Option<OfflinePushInfo>,
}

impl InvitationLookupResponse {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            invitation: Some(entry.to_invitation()),
            offline_push_info: Some(entry.header.push.clone()),
        }
    }
}

/// Live room view: who is connected and what invitation opened it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation: Option<InvitationInfo>,
    #[serde(rename = "participant")]
    pub participants: Vec<ParticipantMetadata>,
    #[serde(rename = "roomID")]
    pub room_id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_type_wire_values() {
        assert_eq!(serde_json::to_string(&SessionType::Single).unwrap(), "1");
        assert_eq!(
            serde_json::from_str::<SessionType>("3").unwrap(),
            SessionType::SuperGroup
        );
        assert!(serde_json::from_str::<SessionType>("9").is_err());
    }

    #[test]
    fn test_invitation_info_uses_client_field_names() {
        let json = serde_json::json!({
            "inviterUserID": "A",
            "inviteeUserIDList": ["B"],
            "roomID": "r1",
            "timeout": 30,
            "mediaType": "video",
            "sessionType": 1,
            "platformID": 2
        });
        let info: InvitationInfo = serde_json::from_value(json).unwrap();

        assert_eq!(info.inviter_user_id, "A");
        assert_eq!(info.invitee_user_ids, vec!["B".to_string()]);
        assert_eq!(info.room_id, "r1");
        assert_eq!(info.media_type, MediaType::Video);
        assert!(info.group_id.is_empty());
        assert!(info.busy_line_user_ids.is_empty());
    }

    #[test]
    fn test_signal_request_tags() {
        let json = serde_json::json!({
            "getTokenByRoomID": {"roomID": "r1", "userID": "B"}
        });
        let req: SignalRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.verb(), "get_token_by_room_id");

        let unknown = serde_json::json!({"transfer": {}});
        assert!(serde_json::from_value::<SignalRequest>(unknown).is_err());
    }

    #[test]
    fn test_cache_entry_flattens_header() {
        let invitation = InvitationInfo {
            inviter_user_id: "A".to_string(),
            invitee_user_ids: vec!["B".to_string()],
            room_id: "r1".to_string(),
            timeout: 30,
            initiate_time: 1_700_000_000,
            ..Default::default()
        };
        let entry = CacheEntry {
            header: InvitationHeader::from_invitation(&invitation, None, "RM_1"),
            invitee_user_ids: invitation.invitee_user_ids.clone(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["sid"], "RM_1");
        assert_eq!(value["room_id"], "r1");
        assert_eq!(value["inviteeUserIDList"][0], "B");

        let back: CacheEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back.to_invitation(), invitation);
    }

    #[test]
    fn test_header_defaults_initiate_time_to_now() {
        let invitation = InvitationInfo::default();
        let before = Utc::now().timestamp();
        let header = InvitationHeader::from_invitation(&invitation, None, "RM_1");
        assert!(header.initiate_time.timestamp() >= before);
    }

    #[test]
    fn test_invitee_status_terminality() {
        assert!(!InviteeStatus::Pending.is_terminal());
        for status in [
            InviteeStatus::Accepted,
            InviteeStatus::Rejected,
            InviteeStatus::HungUp,
            InviteeStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
            assert_eq!(status.as_str().parse::<InviteeStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_pagination_bounds() {
        let page = Pagination {
            page_number: 3,
            show_number: 10,
        };
        assert_eq!(page.limit(), 10);
        assert_eq!(page.offset(), 20);

        let zero = Pagination {
            page_number: 0,
            show_number: 0,
        };
        assert_eq!(zero.limit(), 1);
        assert_eq!(zero.offset(), 0);

        let huge = Pagination {
            page_number: 1,
            show_number: 50_000,
        };
        assert_eq!(huge.limit(), i64::from(MAX_PAGE_SIZE));
    }

    #[test]
    fn test_group_meeting_metadata() {
        let creator = UserInfo {
            user_id: "A".to_string(),
            nickname: "Alice".to_string(),
            account: "alice".to_string(),
        };
        let audio = MeetingMetadata::for_group_call("g1", &creator, MediaType::Audio, 100);
        assert!(audio.detail.setting.disable_camera_on_join);
        assert_eq!(audio.media_type(), MediaType::Audio);
        assert_eq!(audio.detail.info.system_generated.meeting_id, "g1");
        assert_eq!(audio.detail.info.creator_defined.host_user_id, "A");
        let personal = audio.personal_data.first().unwrap();
        assert!(!personal.personal_setting.camera_on_entry);
        assert!(personal.limit_setting.microphone_on_entry);

        let video = MeetingMetadata::for_group_call("g1", &creator, MediaType::Video, 100);
        assert_eq!(video.media_type(), MediaType::Video);

        // An empty 1:1 room metadata blob still decodes
        let empty: MeetingMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, MeetingMetadata::default());
    }
}
