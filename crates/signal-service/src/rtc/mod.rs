//! RTC room orchestration.
//!
//! `RoomProvider` is the seam to the external media service (room and
//! participant primitives only). `RoomOrchestrator` layers the signaling
//! semantics on top: create-or-join, not-found-tolerant removal, the
//! busy-line scan and metadata decoding.
//!
//! The provider allocates `sid`; this service never generates one.

pub mod livekit;
pub mod webhook;

use crate::errors::SignalError;
use crate::models::{
    InvitationInfo, MeetingMetadata, ParticipantMetadata, RoomView, SessionType,
};
use crate::observability::metrics;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A live room as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcRoom {
    pub sid: String,
    pub name: String,
    /// Opaque JSON written at creation (serialized `MeetingMetadata`).
    pub metadata: String,
    pub num_participants: u32,
}

/// A connected participant as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtcParticipant {
    pub identity: String,
    pub name: String,
    /// Opaque JSON written into the access token (serialized `ParticipantMetadata`).
    pub metadata: String,
}

/// Room-management primitives of an external RTC service.
#[async_trait]
pub trait RoomProvider: Send + Sync {
    /// List active rooms; an empty `names` lists all of them.
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<RtcRoom>, SignalError>;

    /// Returns the room's `sid`, or `RoomNotFound`.
    async fn room_exists(&self, room_id: &str) -> Result<String, SignalError> {
        let rooms = self.list_rooms(&[room_id.to_string()]).await?;
        rooms
            .into_iter()
            .find(|room| room.name == room_id)
            .map(|room| room.sid)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.to_string()))
    }

    async fn create_room(&self, room_id: &str, metadata: &str) -> Result<RtcRoom, SignalError>;

    async fn list_participants(&self, room_id: &str) -> Result<Vec<RtcParticipant>, SignalError>;

    /// Fails with `RoomNotFound`/`ParticipantNotFound` when already gone.
    async fn remove_participant(&self, room_id: &str, identity: &str)
        -> Result<(), SignalError>;

    /// Mint a participant access token for `room_id`.
    fn issue_token(
        &self,
        room_id: &str,
        identity: &str,
        name: &str,
        metadata: &str,
    ) -> Result<String, SignalError>;

    /// URL clients connect media to.
    fn live_url(&self) -> String;
}

/// Result of creating a room for the inviter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomGrant {
    pub sid: String,
    pub token: String,
    pub live_url: String,
}

/// Result of joining an existing room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGrant {
    pub token: String,
    pub live_url: String,
}

/// Signaling-level operations over a `RoomProvider`.
#[derive(Clone)]
pub struct RoomOrchestrator {
    provider: Arc<dyn RoomProvider>,
}

impl RoomOrchestrator {
    pub fn new(provider: Arc<dyn RoomProvider>) -> Self {
        Self { provider }
    }

    /// `sid` of a live room, or `RoomNotFound`.
    pub async fn room_exists(&self, room_id: &str) -> Result<String, SignalError> {
        self.provider.room_exists(room_id).await
    }

    /// Create the room with its meeting metadata and hand the creator a token.
    #[instrument(skip_all, fields(room_id = %room_id, creator_id = %creator_id))]
    pub async fn create_room(
        &self,
        room_id: &str,
        creator_id: &str,
        room_metadata: &MeetingMetadata,
        participant: &ParticipantMetadata,
    ) -> Result<RoomGrant, SignalError> {
        let metadata = serde_json::to_string(room_metadata)?;
        let room = self.provider.create_room(room_id, &metadata).await?;
        let join = self.join_token(room_id, creator_id, Some(participant))?;

        debug!(target: "signal.rtc", room_id = %room_id, sid = %room.sid, "Room created");

        Ok(RoomGrant {
            sid: room.sid,
            token: join.token,
            live_url: join.live_url,
        })
    }

    /// Fresh token for an existing room. No provider side effects.
    pub fn join_token(
        &self,
        room_id: &str,
        user_id: &str,
        participant: Option<&ParticipantMetadata>,
    ) -> Result<JoinGrant, SignalError> {
        let (name, metadata) = match participant {
            Some(p) => (p.nickname.clone(), serde_json::to_string(p)?),
            None => (String::new(), String::new()),
        };
        let token = self
            .provider
            .issue_token(room_id, user_id, &name, &metadata)?;

        Ok(JoinGrant {
            token,
            live_url: self.provider.live_url(),
        })
    }

    /// Drop a participant. Already-gone rooms and participants are not errors.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn remove_participant(&self, room_id: &str, user_id: &str) -> Result<(), SignalError> {
        match self.provider.remove_participant(room_id, user_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(target: "signal.rtc", room_id = %room_id, user_id = %user_id, "Participant already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Candidates currently connected to any active room.
    ///
    /// Walks every room and its participants. A room torn down mid-scan is
    /// treated as empty; other provider errors abort the scan.
    #[instrument(skip_all, fields(candidates = candidate_user_ids.len()))]
    pub async fn scan_busy_line(
        &self,
        candidate_user_ids: &[String],
    ) -> Result<Vec<String>, SignalError> {
        let candidates: HashSet<&str> = candidate_user_ids.iter().map(String::as_str).collect();
        let rooms = self.provider.list_rooms(&[]).await?;
        metrics::record_busy_line_scan(rooms.len());

        let mut busy: Vec<String> = Vec::new();
        for room in &rooms {
            let participants = match self.provider.list_participants(&room.name).await {
                Ok(participants) => participants,
                Err(SignalError::RoomNotFound(_)) => {
                    debug!(target: "signal.rtc", room_id = %room.name, "Room closed during busy-line scan");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for participant in participants {
                if candidates.contains(participant.identity.as_str())
                    && !busy.contains(&participant.identity)
                {
                    busy.push(participant.identity);
                }
            }
        }

        Ok(busy)
    }

    /// Decoded participant metadata and the identities of everyone in the room.
    /// Participants whose metadata does not decode are still listed by identity.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn list_participants(
        &self,
        room_id: &str,
    ) -> Result<(Vec<ParticipantMetadata>, Vec<String>), SignalError> {
        let participants = self.provider.list_participants(room_id).await?;
        Ok(decode_participants(&participants))
    }

    /// The group's live room: who is in it and the invitation its metadata implies.
    #[instrument(skip_all, fields(group_id = %group_id))]
    pub async fn get_room_by_group_id(&self, group_id: &str) -> Result<RoomView, SignalError> {
        let (participants, user_ids) = match self.list_participants(group_id).await {
            Ok(found) => found,
            Err(SignalError::RoomNotFound(_)) => return Ok(RoomView::default()),
            Err(e) => return Err(e),
        };
        if participants.is_empty() {
            return Ok(RoomView::default());
        }

        let rooms = self.provider.list_rooms(&[group_id.to_string()]).await?;
        let invitation = match rooms.into_iter().find(|room| room.name == group_id) {
            Some(room) => {
                if room.metadata.is_empty() {
                    warn!(target: "signal.rtc", group_id = %group_id, "Group room has no metadata");
                    return Err(SignalError::InvitationNotFound(format!(
                        "room {group_id} metadata is empty"
                    )));
                }
                let metadata: MeetingMetadata = serde_json::from_str(&room.metadata)?;
                Some(group_invitation(&metadata, user_ids))
            }
            None => None,
        };

        Ok(RoomView {
            invitation,
            participants,
            room_id: group_id.to_string(),
        })
    }

    /// Rooms with decoded participants and invitation metadata.
    /// Rooms whose metadata does not decode are skipped.
    #[instrument(skip_all, fields(count = room_ids.len()))]
    pub async fn get_rooms(&self, room_ids: &[String]) -> Result<Vec<RoomView>, SignalError> {
        let rooms = self.provider.list_rooms(room_ids).await?;
        let mut views = Vec::with_capacity(rooms.len());

        for room in rooms {
            let participants = match self.provider.list_participants(&room.name).await {
                Ok(participants) => participants,
                Err(SignalError::RoomNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let (participants, user_ids) = decode_participants(&participants);

            let metadata: MeetingMetadata = match serde_json::from_str(&room.metadata) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(target: "signal.rtc", error = %e, room_id = %room.name, "Skipping room with undecodable metadata");
                    continue;
                }
            };
            let invitation = if metadata.detail.info.system_generated.meeting_id.is_empty() {
                None
            } else {
                Some(group_invitation(&metadata, user_ids))
            };

            views.push(RoomView {
                invitation,
                participants,
                room_id: room.name,
            });
        }

        Ok(views)
    }
}

fn decode_participants(participants: &[RtcParticipant]) -> (Vec<ParticipantMetadata>, Vec<String>) {
    let mut metadata = Vec::with_capacity(participants.len());
    let mut user_ids = Vec::with_capacity(participants.len());
    for participant in participants {
        user_ids.push(participant.identity.clone());
        match serde_json::from_str::<ParticipantMetadata>(&participant.metadata) {
            Ok(decoded) => metadata.push(decoded),
            Err(e) => {
                warn!(
                    target: "signal.rtc",
                    error = %e,
                    identity = %participant.identity,
                    "Undecodable participant metadata"
                );
            }
        }
    }
    (metadata, user_ids)
}

fn group_invitation(metadata: &MeetingMetadata, user_ids: Vec<String>) -> InvitationInfo {
    let system = &metadata.detail.info.system_generated;
    InvitationInfo {
        inviter_user_id: system.creator_user_id.clone(),
        invitee_user_ids: user_ids,
        group_id: system.meeting_id.clone(),
        room_id: system.meeting_id.clone(),
        media_type: metadata.media_type(),
        session_type: SessionType::SuperGroup,
        initiate_time: system.start_time,
        ..Default::default()
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockRoomProvider;
    use super::*;
    use crate::models::{MediaType, UserInfo};

    fn participant_json(user_id: &str) -> String {
        serde_json::to_string(&ParticipantMetadata {
            user_id: user_id.to_string(),
            nickname: format!("nick-{user_id}"),
            account: user_id.to_lowercase(),
        })
        .unwrap()
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_room_exists_returns_sid_or_not_found() {
        let provider = MockRoomProvider::default().with_room("r1", "{}", &[]);
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));

        assert_eq!(orchestrator.room_exists("r1").await.unwrap(), "RM_r1");
        assert!(matches!(
            orchestrator.room_exists("r2").await,
            Err(SignalError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_busy_line_reports_connected_candidates_once() {
        let a = participant_json("A");
        let c = participant_json("C");
        let provider = MockRoomProvider::default()
            .with_room("r1", "{}", &[("A", &a), ("X", "")])
            .with_room("r2", "{}", &[("C", &c), ("A", &a)]);
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));

        let busy = orchestrator
            .scan_busy_line(&ids(&["A", "B", "C"]))
            .await
            .unwrap();
        assert_eq!(busy, ids(&["A", "C"]));
    }

    #[tokio::test]
    async fn test_scan_busy_line_tolerates_room_closing_mid_scan() {
        let b = participant_json("B");
        let provider = MockRoomProvider::default()
            .with_room("gone", "{}", &[("B", &b)])
            .with_room("live", "{}", &[]);
        provider.vanishing.lock().unwrap().push("gone".to_string());
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));

        let busy = orchestrator.scan_busy_line(&ids(&["B"])).await.unwrap();
        assert!(busy.is_empty(), "stale negative is acceptable");
    }

    #[tokio::test]
    async fn test_remove_participant_swallows_not_found() {
        let provider = MockRoomProvider::default();
        *provider.remove_error.lock().unwrap() =
            Some(SignalError::ParticipantNotFound("B".to_string()));
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));
        orchestrator.remove_participant("r1", "B").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_participant_surfaces_provider_errors() {
        let provider = MockRoomProvider::default();
        *provider.remove_error.lock().unwrap() = Some(SignalError::Provider("503".to_string()));
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));
        assert!(matches!(
            orchestrator.remove_participant("r1", "B").await,
            Err(SignalError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_create_room_embeds_metadata_and_grants_creator() {
        let provider = Arc::new(MockRoomProvider::default());
        let orchestrator = RoomOrchestrator::new(provider.clone());
        let participant = ParticipantMetadata {
            user_id: "A".to_string(),
            nickname: "Alice".to_string(),
            account: "alice".to_string(),
        };

        let grant = orchestrator
            .create_room("r1", "A", &MeetingMetadata::default(), &participant)
            .await
            .unwrap();

        assert_eq!(grant.sid, "RM_r1");
        assert_eq!(grant.token, "token:r1:A");
        assert_eq!(grant.live_url, "ws://rtc.test");
        let rooms = provider.list_rooms(&[]).await.unwrap();
        let stored: MeetingMetadata =
            serde_json::from_str(&rooms.first().unwrap().metadata).unwrap();
        assert_eq!(stored, MeetingMetadata::default());
    }

    #[tokio::test]
    async fn test_get_room_by_group_id_synthesizes_invitation() {
        let creator = UserInfo {
            user_id: "A".to_string(),
            nickname: "Alice".to_string(),
            account: "alice".to_string(),
        };
        let metadata = serde_json::to_string(&MeetingMetadata::for_group_call(
            "g1",
            &creator,
            MediaType::Audio,
            1_700_000_000,
        ))
        .unwrap();
        let a = participant_json("A");
        let b = participant_json("B");
        let provider =
            MockRoomProvider::default().with_room("g1", &metadata, &[("A", &a), ("B", &b)]);
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));

        let view = orchestrator.get_room_by_group_id("g1").await.unwrap();
        assert_eq!(view.room_id, "g1");
        assert_eq!(view.participants.len(), 2);
        let invitation = view.invitation.unwrap();
        assert_eq!(invitation.inviter_user_id, "A");
        assert_eq!(invitation.group_id, "g1");
        assert_eq!(invitation.media_type, MediaType::Audio);
        assert_eq!(invitation.invitee_user_ids, ids(&["A", "B"]));
    }

    #[tokio::test]
    async fn test_get_room_by_group_id_empty_and_missing_metadata() {
        let provider = MockRoomProvider::default().with_room("g-empty", "{}", &[]);
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));
        assert_eq!(
            orchestrator.get_room_by_group_id("g-empty").await.unwrap(),
            RoomView::default()
        );
        assert_eq!(
            orchestrator.get_room_by_group_id("unknown").await.unwrap(),
            RoomView::default()
        );

        let a = participant_json("A");
        let provider = MockRoomProvider::default().with_room("g2", "", &[("A", &a)]);
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));
        assert!(matches!(
            orchestrator.get_room_by_group_id("g2").await,
            Err(SignalError::InvitationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_rooms_skips_undecodable_metadata() {
        let a = participant_json("A");
        let provider = MockRoomProvider::default()
            .with_room("ok", "{}", &[("A", &a), ("legacy", "not-json")])
            .with_room("broken", "not-json", &[]);
        let orchestrator = RoomOrchestrator::new(Arc::new(provider));

        let views = orchestrator.get_rooms(&[]).await.unwrap();
        assert_eq!(views.len(), 1);
        let view = views.first().unwrap();
        assert_eq!(view.room_id, "ok");
        assert_eq!(view.participants.len(), 1);
        assert!(view.invitation.is_none());
    }
}
