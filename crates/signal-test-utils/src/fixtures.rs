//! Request fixtures.
//!
//! Invitations default to a 30 second timeout, video, platform 1. The
//! session type follows the call shape: `Single` for `invitation`,
//! `SuperGroup` for `group_invitation`.

use signal_service::models::{
    GetTokenByRoomIdRequest, InvitationInfo, InviteRequest, MediaType, OfflinePushInfo,
    SessionType, SignalActionRequest, SignalRequest,
};

pub const TEST_TIMEOUT_SECONDS: i32 = 30;
pub const TEST_PLATFORM_ID: i32 = 1;

fn ids(user_ids: &[&str]) -> Vec<String> {
    user_ids.iter().map(|id| (*id).to_string()).collect()
}

/// 1:1 invitation.
pub fn invitation(inviter: &str, invitees: &[&str], room_id: &str) -> InvitationInfo {
    InvitationInfo {
        inviter_user_id: inviter.to_string(),
        invitee_user_ids: ids(invitees),
        room_id: room_id.to_string(),
        timeout: TEST_TIMEOUT_SECONDS,
        media_type: MediaType::Video,
        platform_id: TEST_PLATFORM_ID,
        session_type: SessionType::Single,
        ..Default::default()
    }
}

/// Group invitation. The room is named after the group.
pub fn group_invitation(inviter: &str, invitees: &[&str], group_id: &str) -> InvitationInfo {
    InvitationInfo {
        group_id: group_id.to_string(),
        session_type: SessionType::SuperGroup,
        ..invitation(inviter, invitees, group_id)
    }
}

pub fn push_info(title: &str) -> OfflinePushInfo {
    OfflinePushInfo {
        title: title.to_string(),
        desc: "incoming call".to_string(),
        ..Default::default()
    }
}

pub fn invite(inviter: &str, invitees: &[&str], room_id: &str) -> SignalRequest {
    SignalRequest::Invite(InviteRequest {
        invitation: invitation(inviter, invitees, room_id),
        offline_push_info: None,
    })
}

pub fn invite_in_group(inviter: &str, invitees: &[&str], group_id: &str) -> SignalRequest {
    SignalRequest::InviteInGroup(InviteRequest {
        invitation: group_invitation(inviter, invitees, group_id),
        offline_push_info: None,
    })
}

pub fn action(user_id: &str, invitation: &InvitationInfo) -> SignalActionRequest {
    SignalActionRequest {
        invitation: invitation.clone(),
        offline_push_info: None,
        user_id: user_id.to_string(),
    }
}

pub fn accept(user_id: &str, invitation: &InvitationInfo) -> SignalRequest {
    SignalRequest::Accept(action(user_id, invitation))
}

pub fn reject(user_id: &str, invitation: &InvitationInfo) -> SignalRequest {
    SignalRequest::Reject(action(user_id, invitation))
}

pub fn cancel(user_id: &str, invitation: &InvitationInfo) -> SignalRequest {
    SignalRequest::Cancel(action(user_id, invitation))
}

pub fn hung_up(user_id: &str, invitation: &InvitationInfo) -> SignalRequest {
    SignalRequest::HungUp(action(user_id, invitation))
}

pub fn token_request(room_id: &str, user_id: &str) -> GetTokenByRoomIdRequest {
    GetTokenByRoomIdRequest {
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
    }
}
