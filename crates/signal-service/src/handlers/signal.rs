//! Signaling handlers.
//!
//! - `POST /v1/signal/assemble` - Run one verb and relay its envelope
//! - `POST /v1/signal/invitation/room` - Cached invitation by room
//! - `POST /v1/signal/invitation/start-app` - Pending invitation for a reconnecting user
//! - `POST /v1/signal/room/group` - Live room of a group
//! - `POST /v1/signal/room/token` - Join token for a live room
//! - `POST /v1/signal/rooms` - Live rooms with participants

use crate::errors::SignalError;
use crate::models::{
    GetTokenByRoomIdRequest, InvitationLookupResponse, RoomView, SignalRequest, SignalResponse,
    TokenResponse,
};
use crate::notification::MsgEnvelope;
use crate::routes::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Response for the assemble endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembleResponse {
    #[serde(rename = "signalResp")]
    pub signal_resp: SignalResponse,
    /// The relayed envelope; absent for verbs that notify nobody.
    #[serde(rename = "msgData", skip_serializing_if = "Option::is_none")]
    pub msg_data: Option<MsgEnvelope>,
    /// False when the relay refused the envelope. The transition stands.
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoomIdRequest {
    #[serde(rename = "roomID")]
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserIdRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupIdRequest {
    #[serde(rename = "groupID")]
    pub group_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoomsRequest {
    #[serde(rename = "roomIDs")]
    pub room_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsResponse {
    #[serde(rename = "roomList")]
    pub room_list: Vec<RoomView>,
}

/// Handler for POST /v1/signal/assemble
///
/// Malformed JSON is an invalid argument; well-formed JSON naming an
/// unknown verb is an internal error.
#[instrument(skip_all)]
pub async fn signal_assemble(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AssembleResponse>, SignalError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| SignalError::InvalidArgument(format!("malformed request body: {e}")))?;
    let request: SignalRequest = serde_json::from_value(value)
        .map_err(|e| SignalError::Internal(format!("unknown signal payload: {e}")))?;

    let (signal_resp, msg_data) = state.engine.assemble(request).await?;

    let delivered = match &msg_data {
        Some(envelope) => match state.relay.send(envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "signal.handlers",
                    error = %e,
                    client_msg_id = %envelope.client_msg_id,
                    "Relay failed after state transition"
                );
                false
            }
        },
        None => true,
    };

    Ok(Json(AssembleResponse {
        signal_resp,
        msg_data,
        delivered,
    }))
}

/// Handler for POST /v1/signal/invitation/room
#[instrument(skip_all, fields(room_id = %req.room_id))]
pub async fn get_signal_invitation_info(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoomIdRequest>,
) -> Result<Json<InvitationLookupResponse>, SignalError> {
    Ok(Json(
        state.engine.get_signal_invitation_info(&req.room_id).await?,
    ))
}

/// Handler for POST /v1/signal/invitation/start-app
#[instrument(skip_all, fields(user_id = %req.user_id))]
pub async fn get_signal_invitation_info_start_app(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserIdRequest>,
) -> Result<Json<InvitationLookupResponse>, SignalError> {
    Ok(Json(
        state
            .engine
            .get_signal_invitation_info_start_app(&req.user_id)
            .await?,
    ))
}

/// Handler for POST /v1/signal/room/group
#[instrument(skip_all, fields(group_id = %req.group_id))]
pub async fn get_room_by_group_id(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GroupIdRequest>,
) -> Result<Json<RoomView>, SignalError> {
    Ok(Json(state.engine.get_room_by_group_id(&req.group_id).await?))
}

/// Handler for POST /v1/signal/room/token
#[instrument(skip_all, fields(room_id = %req.room_id))]
pub async fn get_token_by_room_id(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetTokenByRoomIdRequest>,
) -> Result<Json<TokenResponse>, SignalError> {
    Ok(Json(state.engine.get_token_by_room_id(req).await?))
}

/// Handler for POST /v1/signal/rooms
#[instrument(skip_all, fields(count = req.room_ids.len()))]
pub async fn get_rooms(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoomsRequest>,
) -> Result<Json<RoomsResponse>, SignalError> {
    let room_list = state.engine.get_rooms(&req.room_ids).await?;
    Ok(Json(RoomsResponse { room_list }))
}
