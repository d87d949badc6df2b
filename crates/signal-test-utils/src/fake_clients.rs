//! Fake peer services: user directory and messaging relay.

use async_trait::async_trait;
use signal_service::clients::{MessagingRelay, UserDirectory};
use signal_service::errors::SignalError;
use signal_service::models::UserInfo;
use signal_service::notification::MsgEnvelope;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// User directory backed by a fixed map. Unknown users are `UserNotFound`.
#[derive(Debug, Default)]
pub struct StaticUserDirectory {
    users: Mutex<HashMap<String, UserInfo>>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user whose account is the lowercased id.
    pub fn with_user(self, user_id: &str, nickname: &str) -> Self {
        self.add_user(user_id, nickname);
        self
    }

    pub fn add_user(&self, user_id: &str, nickname: &str) {
        self.users.lock().unwrap().insert(
            user_id.to_string(),
            UserInfo {
                user_id: user_id.to_string(),
                nickname: nickname.to_string(),
                account: user_id.to_lowercase(),
            },
        );
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo, SignalError> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| SignalError::UserNotFound(user_id.to_string()))
    }
}

/// Relay that records every envelope it accepts.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<MsgEnvelope>>,
    failing: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every subsequent envelope with a relay error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<MsgEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<MsgEnvelope> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MessagingRelay for RecordingRelay {
    async fn send(&self, envelope: &MsgEnvelope) -> Result<(), SignalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SignalError::Relay("relay unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}
