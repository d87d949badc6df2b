//! Signaling engine: the per-verb state machine.
//!
//! Each verb runs the same pipeline: validate, act on the RTC provider,
//! record through the repository, then assemble the envelope for the
//! counterpart. Any provider or storage failure returns before an envelope
//! exists, so a notification is never built for a transition that did not
//! happen. The caller forwards the envelope to the relay.
//!
//! Status transitions per `(sid, user)`:
//!
//! ```text
//! Pending --accept--> Accepted
//! Pending --reject--> Rejected
//! Pending --hung_up-> HungUp
//! Pending --cancel--> Cancelled   (inviter only; clears the room entry)
//! ```
//!
//! Accept and Reject on a handled row are refused with `Conflict`. HungUp and
//! Cancel are retry-safe: a handled row is left untouched and the verb still
//! completes.

use crate::clients::UserDirectory;
use crate::errors::SignalError;
use crate::models::{
    AcceptResponse, EmptyResponse, GetTokenByRoomIdRequest, InvitationHeader, InvitationInfo,
    InvitationLookupResponse, InviteRequest, InviteResponse, MeetingMetadata, Pagination,
    ParticipantMetadata, RecordFilter, RoomView, SignalActionRequest, SignalRecord,
    SignalRequest, SignalResponse, StatusTransition, TokenResponse,
};
use crate::notification::{MsgEnvelope, NotificationAssembler, Route};
use crate::observability::metrics;
use crate::repository::SignalRepository;
use crate::rtc::webhook::{MembershipChange, WebhookEvent};
use crate::rtc::RoomOrchestrator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Verb outcome: the protocol response plus the envelope to relay, if any.
pub type Assembled = (SignalResponse, Option<MsgEnvelope>);

/// Sequences provider, repository and notification work for every verb.
#[derive(Clone)]
pub struct SignalingEngine {
    repository: SignalRepository,
    rooms: RoomOrchestrator,
    users: Arc<dyn UserDirectory>,
    assembler: NotificationAssembler,
    default_timeout_seconds: i32,
}

impl SignalingEngine {
    pub fn new(
        repository: SignalRepository,
        rooms: RoomOrchestrator,
        users: Arc<dyn UserDirectory>,
        default_timeout_seconds: i32,
    ) -> Self {
        Self {
            repository,
            rooms,
            users,
            assembler: NotificationAssembler::new(),
            default_timeout_seconds,
        }
    }

    /// Run one signaling verb.
    pub async fn assemble(&self, request: SignalRequest) -> Result<Assembled, SignalError> {
        let verb = request.verb();
        let start = Instant::now();

        let result = match request {
            SignalRequest::Invite(req) => self.invite(req, false).await,
            SignalRequest::InviteInGroup(req) => self.invite(req, true).await,
            SignalRequest::Cancel(req) => self.cancel(req).await,
            SignalRequest::Accept(req) => self.accept(req).await,
            SignalRequest::Reject(req) => self.reject(req).await,
            SignalRequest::HungUp(req) => self.hung_up(req).await,
            SignalRequest::GetTokenByRoomId(req) => self
                .token_with_metadata(req)
                .await
                .map(|resp| (SignalResponse::GetTokenByRoomId(resp), None)),
        };

        record(verb, &result, start);
        result
    }

    // ------------------------------------------------------------------
    // Verbs
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(room_id = %req.invitation.room_id, inviter = %req.invitation.inviter_user_id, group = in_group))]
    async fn invite(&self, req: InviteRequest, in_group: bool) -> Result<Assembled, SignalError> {
        let InviteRequest {
            mut invitation,
            offline_push_info,
        } = req;

        validate_invitation(&invitation)?;
        if in_group && invitation.group_id.is_empty() {
            return Err(SignalError::InvalidArgument(
                "group id is required for a group invitation".to_string(),
            ));
        }
        self.normalize(&mut invitation);

        let inviter = self.users.get_user_info(&invitation.inviter_user_id).await?;
        let busy = self
            .rooms
            .scan_busy_line(&invitation.invitee_user_ids)
            .await?;
        if !busy.is_empty() {
            debug!(target: "signal.engine", room_id = %invitation.room_id, busy = ?busy, "Invitees on another call");
        }
        invitation.busy_line_user_ids = busy.clone();

        let room_metadata = if in_group {
            MeetingMetadata::for_group_call(
                &invitation.group_id,
                &inviter,
                invitation.media_type,
                invitation.initiate_time,
            )
        } else {
            MeetingMetadata::default()
        };
        let participant = ParticipantMetadata::from(inviter);

        let (sid, token, live_url) = match self.rooms.room_exists(&invitation.room_id).await {
            Ok(sid) => {
                let join = self.rooms.join_token(
                    &invitation.room_id,
                    &invitation.inviter_user_id,
                    Some(&participant),
                )?;
                (sid, join.token, join.live_url)
            }
            Err(SignalError::RoomNotFound(_)) => {
                let grant = self
                    .rooms
                    .create_room(
                        &invitation.room_id,
                        &invitation.inviter_user_id,
                        &room_metadata,
                        &participant,
                    )
                    .await?;
                (grant.sid, grant.token, grant.live_url)
            }
            Err(e) => return Err(e),
        };

        let header = InvitationHeader::from_invitation(&invitation, offline_push_info.as_ref(), &sid);
        self.repository
            .create_signal(&header, &invitation.invitee_user_ids)
            .await?;

        info!(
            target: "signal.engine",
            room_id = %invitation.room_id,
            sid = %sid,
            invitees = invitation.invitee_user_ids.len(),
            "Invitation created"
        );

        let route = if in_group {
            Route::group(&invitation.inviter_user_id, &invitation)
        } else {
            let first = first_invitee(&invitation)?;
            Route::direct(&invitation.inviter_user_id, first, &invitation)
        };

        let response = InviteResponse {
            token,
            room_id: invitation.room_id.clone(),
            live_url,
            busy_line_user_ids: busy,
        };
        let payload_request = InviteRequest {
            invitation,
            offline_push_info: offline_push_info.clone(),
        };
        let (payload, response) = if in_group {
            (
                SignalRequest::InviteInGroup(payload_request),
                SignalResponse::InviteInGroup(response),
            )
        } else {
            (
                SignalRequest::Invite(payload_request),
                SignalResponse::Invite(response),
            )
        };

        let envelope = self
            .assembler
            .signaling(route, &payload, offline_push_info)?;
        Ok((response, Some(envelope)))
    }

    #[instrument(skip_all, fields(room_id = %req.invitation.room_id, user_id = %req.user_id))]
    async fn cancel(&self, req: SignalActionRequest) -> Result<Assembled, SignalError> {
        validate_action(&req)?;
        let invitation = &req.invitation;
        let route = if invitation.session_type.is_single() {
            Route::direct(&req.user_id, first_invitee(invitation)?, invitation)
        } else {
            Route::group(&req.user_id, invitation)
        };

        let sid = self.resolve_cancel_sid(&invitation.room_id).await?;
        // The payload's inviter is caller-supplied; check the recorded one
        let header = self
            .repository
            .get_signal_header(&invitation.room_id, &sid)
            .await?;
        if header.inviter_user_id != req.user_id {
            return Err(SignalError::PermissionDenied(
                "only the inviter can cancel an invitation".to_string(),
            ));
        }
        self.rooms
            .remove_participant(&invitation.room_id, &req.user_id)
            .await?;
        let transition = self
            .repository
            .cancel_signal_invitation(&sid, &invitation.room_id, &req.user_id)
            .await?;
        note_idempotent("cancel", &sid, &req.user_id, transition);

        let envelope = self.assembler.signaling(
            route,
            &SignalRequest::Cancel(req.clone()),
            req.offline_push_info.clone(),
        )?;
        Ok((SignalResponse::Cancel(EmptyResponse {}), Some(envelope)))
    }

    #[instrument(skip_all, fields(room_id = %req.invitation.room_id, user_id = %req.user_id))]
    async fn accept(&self, req: SignalActionRequest) -> Result<Assembled, SignalError> {
        validate_action(&req)?;
        let invitation = &req.invitation;

        let sid = self.rooms.room_exists(&invitation.room_id).await?;
        self.ensure_pending(&sid, &req.user_id).await?;

        let participant = ParticipantMetadata::from(self.users.get_user_info(&req.user_id).await?);
        let join = self
            .rooms
            .join_token(&invitation.room_id, &req.user_id, Some(&participant))?;

        match self
            .repository
            .accept_signal_invitation(&sid, &req.user_id)
            .await?
        {
            StatusTransition::Transitioned => {}
            other => return Err(refused(&sid, &req.user_id, other)),
        }

        let route = Route::direct(&req.user_id, &invitation.inviter_user_id, invitation);
        let envelope = self.assembler.signaling(
            route,
            &SignalRequest::Accept(req.clone()),
            req.offline_push_info.clone(),
        )?;

        Ok((
            SignalResponse::Accept(AcceptResponse {
                token: join.token,
                room_id: invitation.room_id.clone(),
                live_url: join.live_url,
            }),
            Some(envelope),
        ))
    }

    #[instrument(skip_all, fields(room_id = %req.invitation.room_id, user_id = %req.user_id))]
    async fn reject(&self, req: SignalActionRequest) -> Result<Assembled, SignalError> {
        validate_action(&req)?;
        let invitation = &req.invitation;

        let sid = self.rooms.room_exists(&invitation.room_id).await?;
        // A reject after accept must not drop the participant from the call
        self.ensure_pending(&sid, &req.user_id).await?;

        self.rooms
            .remove_participant(&invitation.room_id, &req.user_id)
            .await?;
        match self
            .repository
            .reject_signal_invitation(&sid, &req.user_id)
            .await?
        {
            StatusTransition::Transitioned => {}
            other => return Err(refused(&sid, &req.user_id, other)),
        }

        let route = Route::direct(&req.user_id, &invitation.inviter_user_id, invitation);
        let envelope = self.assembler.signaling(
            route,
            &SignalRequest::Reject(req.clone()),
            req.offline_push_info.clone(),
        )?;
        Ok((SignalResponse::Reject(EmptyResponse {}), Some(envelope)))
    }

    #[instrument(skip_all, fields(room_id = %req.invitation.room_id, user_id = %req.user_id))]
    async fn hung_up(&self, req: SignalActionRequest) -> Result<Assembled, SignalError> {
        validate_action(&req)?;
        let invitation = &req.invitation;
        let route = hung_up_route(&req)?;

        let sid = self.rooms.room_exists(&invitation.room_id).await?;
        self.rooms
            .remove_participant(&invitation.room_id, &req.user_id)
            .await?;
        let transition = self
            .repository
            .hung_up_signal_invitation(&sid, &req.user_id)
            .await?;
        note_idempotent("hung_up", &sid, &req.user_id, transition);

        let envelope = self.assembler.signaling(
            route,
            &SignalRequest::HungUp(req.clone()),
            req.offline_push_info.clone(),
        )?;
        Ok((SignalResponse::HungUp(EmptyResponse {}), Some(envelope)))
    }

    async fn token_with_metadata(
        &self,
        req: GetTokenByRoomIdRequest,
    ) -> Result<TokenResponse, SignalError> {
        validate_token_request(&req)?;
        self.rooms.room_exists(&req.room_id).await?;
        let participant = ParticipantMetadata::from(self.users.get_user_info(&req.user_id).await?);
        let join = self
            .rooms
            .join_token(&req.room_id, &req.user_id, Some(&participant))?;
        Ok(TokenResponse {
            token: join.token,
            live_url: join.live_url,
        })
    }

    // ------------------------------------------------------------------
    // Lookups and bookkeeping
    // ------------------------------------------------------------------

    /// Token for a live room without participant metadata.
    #[instrument(skip_all, fields(room_id = %req.room_id, user_id = %req.user_id))]
    pub async fn get_token_by_room_id(
        &self,
        req: GetTokenByRoomIdRequest,
    ) -> Result<TokenResponse, SignalError> {
        let start = Instant::now();
        let result = self.token_without_metadata(&req).await;
        record("lookup_token", &result, start);
        result
    }

    async fn token_without_metadata(
        &self,
        req: &GetTokenByRoomIdRequest,
    ) -> Result<TokenResponse, SignalError> {
        validate_token_request(req)?;
        self.rooms.room_exists(&req.room_id).await?;
        let join = self.rooms.join_token(&req.room_id, &req.user_id, None)?;
        Ok(TokenResponse {
            token: join.token,
            live_url: join.live_url,
        })
    }

    /// Cached invitation for a room. A miss is `InvitationExpired`.
    pub async fn get_signal_invitation_info(
        &self,
        room_id: &str,
    ) -> Result<InvitationLookupResponse, SignalError> {
        require("room id", room_id)?;
        let entry = self
            .repository
            .get_signal_invitation_info_by_room_id(room_id)
            .await?;
        Ok(InvitationLookupResponse::from_entry(&entry))
    }

    /// Pending invitation for a reconnecting client; empty on a miss.
    pub async fn get_signal_invitation_info_start_app(
        &self,
        user_id: &str,
    ) -> Result<InvitationLookupResponse, SignalError> {
        require("user id", user_id)?;
        match self
            .repository
            .get_available_signal_invitation_info(user_id)
            .await
        {
            Ok(entry) => Ok(InvitationLookupResponse::from_entry(&entry)),
            Err(SignalError::InvitationExpired(_)) => Ok(InvitationLookupResponse::default()),
            Err(e) => Err(e),
        }
    }

    pub async fn get_room_by_group_id(&self, group_id: &str) -> Result<RoomView, SignalError> {
        require("group id", group_id)?;
        self.rooms.get_room_by_group_id(group_id).await
    }

    pub async fn get_rooms(&self, room_ids: &[String]) -> Result<Vec<RoomView>, SignalError> {
        self.rooms.get_rooms(room_ids).await
    }

    pub async fn get_signal_invitation_records(
        &self,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> Result<(i64, Vec<SignalRecord>), SignalError> {
        if let (Some(start), Some(end)) = (filter.start_time, filter.end_time) {
            if start > end {
                return Err(SignalError::InvalidArgument(
                    "start time is after end time".to_string(),
                ));
            }
        }
        self.repository
            .get_signal_invitation_records(filter, pagination)
            .await
    }

    pub async fn delete_signal_records(&self, sids: &[String]) -> Result<(), SignalError> {
        if sids.is_empty() {
            return Err(SignalError::InvalidArgument("sid list is empty".to_string()));
        }
        self.repository.delete_signal_records(sids).await
    }

    /// Attach a recording to a call. Either field may be omitted.
    pub async fn update_recording(
        &self,
        sid: &str,
        file_url: Option<&str>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<(), SignalError> {
        require("sid", sid)?;
        if file_url.is_none() && end_time.is_none() {
            return Err(SignalError::InvalidArgument(
                "nothing to update".to_string(),
            ));
        }
        if let Some(url) = file_url {
            self.repository.update_signal_file_url(sid, url).await?;
        }
        if let Some(end_time) = end_time {
            self.repository.update_signal_end_time(sid, end_time).await?;
        }
        Ok(())
    }

    /// Group membership notification for a provider webhook.
    ///
    /// Returns `None` for events that do not concern a cached group
    /// invitation, or when the roster cannot be read.
    #[instrument(skip_all, fields(event = %event.event))]
    pub async fn handle_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<MsgEnvelope>, SignalError> {
        let (Some(change), Some(room_id)) = (event.membership_change(), event.room_name()) else {
            return Ok(None);
        };

        let entry = match self
            .repository
            .get_signal_invitation_info_by_room_id(room_id)
            .await
        {
            Ok(entry) => entry,
            Err(SignalError::InvitationExpired(_)) => {
                debug!(target: "signal.engine", room_id = %room_id, "No cached invitation for webhook room");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if entry.header.session_type.is_single() {
            return Ok(None);
        }

        let participants = match self.rooms.list_participants(room_id).await {
            Ok((participants, _)) => participants,
            Err(e) => {
                warn!(target: "signal.engine", error = %e, room_id = %room_id, "Failed to list participants for membership notification");
                return Ok(None);
            }
        };

        let envelope = self.assembler.room_participants(
            &entry.to_invitation(),
            participants,
            change == MembershipChange::Joined,
        )?;
        Ok(Some(envelope))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn normalize(&self, invitation: &mut InvitationInfo) {
        if invitation.timeout <= 0 {
            invitation.timeout = self.default_timeout_seconds;
        }
        if invitation.initiate_time <= 0 {
            invitation.initiate_time = Utc::now().timestamp();
        }
    }

    /// Refuse Accept/Reject unless the caller's row is still pending.
    async fn ensure_pending(&self, sid: &str, user_id: &str) -> Result<(), SignalError> {
        match self.repository.find_invitee(sid, user_id).await? {
            None => Err(SignalError::InvitationNotFound(format!(
                "no invitation for {user_id} in {sid}"
            ))),
            Some(row) if row.status.is_terminal() => Err(SignalError::Conflict(format!(
                "invitation already {}",
                row.status
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Cancel must work after the room has emptied, so fall back to the cached sid.
    async fn resolve_cancel_sid(&self, room_id: &str) -> Result<String, SignalError> {
        match self.rooms.room_exists(room_id).await {
            Ok(sid) => Ok(sid),
            Err(SignalError::RoomNotFound(_)) => {
                match self
                    .repository
                    .get_signal_invitation_info_by_room_id(room_id)
                    .await
                {
                    Ok(entry) => Ok(entry.header.sid),
                    Err(SignalError::InvitationExpired(_)) => {
                        Err(SignalError::RoomNotFound(room_id.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}

fn record<T>(verb: &'static str, result: &Result<T, SignalError>, start: Instant) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.metric_label(),
    };
    metrics::record_verb(verb, status, start.elapsed());
}

fn require(field: &str, value: &str) -> Result<(), SignalError> {
    if value.is_empty() {
        return Err(SignalError::InvalidArgument(format!("{field} is required")));
    }
    Ok(())
}

fn validate_invitation(invitation: &InvitationInfo) -> Result<(), SignalError> {
    require("room id", &invitation.room_id)?;
    require("inviter user id", &invitation.inviter_user_id)?;
    if invitation.invitee_user_ids.is_empty() {
        return Err(SignalError::InvalidArgument(
            "invitee user id list is empty".to_string(),
        ));
    }
    if invitation.invitee_user_ids.iter().any(String::is_empty) {
        return Err(SignalError::InvalidArgument(
            "invitee user id list contains an empty id".to_string(),
        ));
    }
    Ok(())
}

fn validate_action(req: &SignalActionRequest) -> Result<(), SignalError> {
    require("room id", &req.invitation.room_id)?;
    require("inviter user id", &req.invitation.inviter_user_id)?;
    require("user id", &req.user_id)
}

fn validate_token_request(req: &GetTokenByRoomIdRequest) -> Result<(), SignalError> {
    require("room id", &req.room_id)?;
    require("user id", &req.user_id)
}

fn first_invitee(invitation: &InvitationInfo) -> Result<&str, SignalError> {
    invitation
        .invitee_user_ids
        .first()
        .map(String::as_str)
        .ok_or_else(|| SignalError::InvalidArgument("invitee user id list is empty".to_string()))
}

/// 1:1 hang-ups go to the other party; group hang-ups go to the group.
fn hung_up_route(req: &SignalActionRequest) -> Result<Route, SignalError> {
    let invitation = &req.invitation;
    if !invitation.session_type.is_single() {
        return Ok(Route::group(&req.user_id, invitation));
    }
    let counterpart = if req.user_id == invitation.inviter_user_id {
        first_invitee(invitation)?
    } else {
        invitation.inviter_user_id.as_str()
    };
    Ok(Route::direct(&req.user_id, counterpart, invitation))
}

fn refused(sid: &str, user_id: &str, transition: StatusTransition) -> SignalError {
    match transition {
        StatusTransition::AlreadyHandled(status) => {
            SignalError::Conflict(format!("invitation already {status}"))
        }
        StatusTransition::Missing => {
            SignalError::InvitationNotFound(format!("no invitation for {user_id} in {sid}"))
        }
        StatusTransition::Transitioned => {
            SignalError::Internal("transition reported as refused".to_string())
        }
    }
}

fn note_idempotent(verb: &'static str, sid: &str, user_id: &str, transition: StatusTransition) {
    match transition {
        StatusTransition::Transitioned => {}
        StatusTransition::AlreadyHandled(status) => {
            debug!(target: "signal.engine", verb, sid = %sid, user_id = %user_id, status = %status, "Row already handled, status left unchanged");
        }
        StatusTransition::Missing => {
            warn!(target: "signal.engine", verb, sid = %sid, user_id = %user_id, "No durable row to update");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{InviteeStatus, SessionType};

    fn action(user_id: &str, session_type: SessionType) -> SignalActionRequest {
        SignalActionRequest {
            invitation: InvitationInfo {
                inviter_user_id: "A".to_string(),
                invitee_user_ids: vec!["B".to_string(), "C".to_string()],
                room_id: "r1".to_string(),
                group_id: if session_type.is_single() {
                    String::new()
                } else {
                    "g1".to_string()
                },
                session_type,
                ..Default::default()
            },
            offline_push_info: None,
            user_id: user_id.to_string(),
        }
    }

    #[test]
    fn test_hung_up_routes_to_counterpart() {
        let by_inviter = hung_up_route(&action("A", SessionType::Single)).unwrap();
        assert_eq!(by_inviter.send_id, "A");
        assert_eq!(by_inviter.recv_id, "B");

        let by_invitee = hung_up_route(&action("B", SessionType::Single)).unwrap();
        assert_eq!(by_invitee.send_id, "B");
        assert_eq!(by_invitee.recv_id, "A");
    }

    #[test]
    fn test_group_hung_up_routes_to_group() {
        let route = hung_up_route(&action("C", SessionType::Group)).unwrap();
        assert!(route.recv_id.is_empty());
        assert_eq!(route.group_id, "g1");
    }

    #[test]
    fn test_hung_up_without_invitees_is_rejected() {
        let mut req = action("A", SessionType::Single);
        req.invitation.invitee_user_ids.clear();
        assert!(matches!(
            hung_up_route(&req),
            Err(SignalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invitation_validation() {
        let mut invitation = action("A", SessionType::Single).invitation;
        assert!(validate_invitation(&invitation).is_ok());

        invitation.invitee_user_ids = vec!["B".to_string(), String::new()];
        assert!(validate_invitation(&invitation).is_err());

        invitation.invitee_user_ids.clear();
        assert!(matches!(
            validate_invitation(&invitation),
            Err(SignalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_action_validation_requires_identities() {
        assert!(validate_action(&action("B", SessionType::Single)).is_ok());
        assert!(validate_action(&action("", SessionType::Single)).is_err());

        let mut no_room = action("B", SessionType::Single);
        no_room.invitation.room_id.clear();
        assert!(validate_action(&no_room).is_err());
    }

    #[test]
    fn test_refused_transitions_map_to_errors() {
        assert!(matches!(
            refused("RM_1", "B", StatusTransition::AlreadyHandled(InviteeStatus::Accepted)),
            SignalError::Conflict(_)
        ));
        assert!(matches!(
            refused("RM_1", "B", StatusTransition::Missing),
            SignalError::InvitationNotFound(_)
        ));
    }
}
