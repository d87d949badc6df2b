//! Fake RTC room provider.
//!
//! Rooms live in a map keyed by name. Participants only appear when a test
//! calls `join`; issuing a token does not connect anyone, same as the real
//! provider. Room sids are `RM_{n}` in creation order.
//!
//! # Example
//!
//! ```rust,ignore
//! let provider = FakeRoomProvider::new();
//! provider.add_room("other-call", "");
//! provider.join("other-call", "B", "");
//!
//! let busy = RoomOrchestrator::new(Arc::new(provider))
//!     .scan_busy_line(&["B".to_string()])
//!     .await?;
//! assert_eq!(busy, vec!["B".to_string()]);
//! ```

use async_trait::async_trait;
use signal_service::errors::SignalError;
use signal_service::rtc::{RoomProvider, RtcParticipant, RtcRoom};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const FAKE_LIVE_URL: &str = "ws://rtc.test";

/// A token minted by the fake provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub room_id: String,
    pub identity: String,
    pub name: String,
    pub metadata: String,
}

#[derive(Debug, Clone)]
struct FakeRoom {
    sid: String,
    metadata: String,
    participants: Vec<RtcParticipant>,
}

/// In-memory `RoomProvider`.
#[derive(Debug, Default)]
pub struct FakeRoomProvider {
    rooms: Mutex<BTreeMap<String, FakeRoom>>,
    issued: Mutex<Vec<IssuedToken>>,
    removed: Mutex<Vec<(String, String)>>,
    next_sid: AtomicUsize,
    create_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeRoomProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room directly, bypassing the signaling flow. Returns its sid.
    pub fn add_room(&self, room_id: &str, metadata: &str) -> String {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get(room_id) {
            return room.sid.clone();
        }
        let sid = format!("RM_{}", self.next_sid.fetch_add(1, Ordering::SeqCst) + 1);
        rooms.insert(
            room_id.to_string(),
            FakeRoom {
                sid: sid.clone(),
                metadata: metadata.to_string(),
                participants: Vec::new(),
            },
        );
        sid
    }

    /// Connect a participant to an existing room.
    pub fn join(&self, room_id: &str, identity: &str, metadata: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms
            .get_mut(room_id)
            .unwrap_or_else(|| panic!("room {room_id} does not exist"));
        room.participants.retain(|p| p.identity != identity);
        room.participants.push(RtcParticipant {
            identity: identity.to_string(),
            name: String::new(),
            metadata: metadata.to_string(),
        });
    }

    /// Disconnect a participant without going through the signaling flow.
    pub fn leave(&self, room_id: &str, identity: &str) {
        if let Some(room) = self.rooms.lock().unwrap().get_mut(room_id) {
            room.participants.retain(|p| p.identity != identity);
        }
    }

    /// Tear the room down, as the provider does once it sits empty.
    pub fn close_room(&self, room_id: &str) {
        self.rooms.lock().unwrap().remove(room_id);
    }

    /// Fail every subsequent call with a provider error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn room_sid(&self, room_id: &str) -> Option<String> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.sid.clone())
    }

    pub fn room_metadata(&self, room_id: &str) -> Option<String> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.metadata.clone())
    }

    pub fn participants(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.participants.iter().map(|p| p.identity.clone()).collect())
            .unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn issued_tokens(&self) -> Vec<IssuedToken> {
        self.issued.lock().unwrap().clone()
    }

    /// `(room_id, identity)` of every successful removal.
    pub fn removed(&self) -> Vec<(String, String)> {
        self.removed.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), SignalError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SignalError::Provider("provider unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoomProvider for FakeRoomProvider {
    async fn list_rooms(&self, names: &[String]) -> Result<Vec<RtcRoom>, SignalError> {
        self.check_available()?;
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(name))
            .map(|(name, room)| RtcRoom {
                sid: room.sid.clone(),
                name: name.clone(),
                metadata: room.metadata.clone(),
                num_participants: u32::try_from(room.participants.len()).unwrap_or(u32::MAX),
            })
            .collect())
    }

    async fn create_room(&self, room_id: &str, metadata: &str) -> Result<RtcRoom, SignalError> {
        self.check_available()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let sid = self.add_room(room_id, metadata);
        Ok(RtcRoom {
            sid,
            name: room_id.to_string(),
            metadata: metadata.to_string(),
            num_participants: 0,
        })
    }

    async fn list_participants(&self, room_id: &str) -> Result<Vec<RtcParticipant>, SignalError> {
        self.check_available()?;
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.participants.clone())
            .ok_or_else(|| SignalError::RoomNotFound(room_id.to_string()))
    }

    async fn remove_participant(&self, room_id: &str, identity: &str) -> Result<(), SignalError> {
        self.check_available()?;
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalError::RoomNotFound(room_id.to_string()))?;
        if !room.participants.iter().any(|p| p.identity == identity) {
            return Err(SignalError::ParticipantNotFound(identity.to_string()));
        }
        room.participants.retain(|p| p.identity != identity);
        self.removed
            .lock()
            .unwrap()
            .push((room_id.to_string(), identity.to_string()));
        Ok(())
    }

    fn issue_token(
        &self,
        room_id: &str,
        identity: &str,
        name: &str,
        metadata: &str,
    ) -> Result<String, SignalError> {
        self.issued.lock().unwrap().push(IssuedToken {
            room_id: room_id.to_string(),
            identity: identity.to_string(),
            name: name.to_string(),
            metadata: metadata.to_string(),
        });
        Ok(format!("token:{room_id}:{identity}"))
    }

    fn live_url(&self) -> String {
        FAKE_LIVE_URL.to_string()
    }
}
