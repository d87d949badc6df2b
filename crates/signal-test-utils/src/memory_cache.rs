//! In-memory invitation cache.
//!
//! Mirrors `RedisInvitationCache` key for key. Expiry runs on
//! `tokio::time::Instant`, so `#[tokio::test(start_paused = true)]` plus
//! `tokio::time::advance` drives TTLs without sleeping.
//!
//! # Example
//!
//! ```rust,ignore
//! let cache = InMemoryInvitationCache::new();
//! cache.create_signal_invite(&header, &["B".to_string()]).await?;
//! tokio::time::advance(Duration::from_secs(31)).await;
//! assert!(!cache.is_unhandled("B").await?);
//! ```

use async_trait::async_trait;
use signal_service::cache::{room_key, user_key, InvitationCache};
use signal_service::errors::SignalError;
use signal_service::models::{CacheEntry, CreateSignalOutcome, InvitationHeader};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Room(CacheEntry),
    Pointer(String),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Instant,
}

/// In-memory `InvitationCache` with TTL expiry.
#[derive(Debug, Default)]
pub struct InMemoryInvitationCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InMemoryInvitationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw key check, honoring expiry. Keys follow the Redis layout.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remaining TTL of a key, if it is still live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let slots = self.slots.lock().unwrap();
        let now = Instant::now();
        slots
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.expires_at - now)
    }

    fn get(&self, key: &str) -> Option<Value> {
        let mut slots = self.slots.lock().unwrap();
        let expired = match slots.get(key) {
            Some(slot) => slot.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            slots.remove(key);
            return None;
        }
        slots.get(key).map(|slot| slot.value.clone())
    }

    fn set(&self, key: String, value: Value, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.slots
            .lock()
            .unwrap()
            .insert(key, Slot { value, expires_at });
    }

    fn read_room(&self, room_id: &str) -> Result<CacheEntry, SignalError> {
        match self.get(&room_key(room_id)) {
            Some(Value::Room(entry)) => Ok(entry),
            _ => Err(SignalError::InvitationExpired(room_key(room_id))),
        }
    }
}

fn ttl_of(header: &InvitationHeader) -> Duration {
    Duration::from_secs(u64::try_from(header.timeout_seconds).unwrap_or(0).max(1))
}

#[async_trait]
impl InvitationCache for InMemoryInvitationCache {
    async fn is_unhandled(&self, user_id: &str) -> Result<bool, SignalError> {
        Ok(self.contains_key(&user_key(user_id)))
    }

    async fn create_signal_invite(
        &self,
        header: &InvitationHeader,
        invitee_user_ids: &[String],
    ) -> Result<CreateSignalOutcome, SignalError> {
        let ttl = ttl_of(header);
        let mut outcome = CreateSignalOutcome::default();

        for user_id in invitee_user_ids {
            if self.contains_key(&user_key(user_id)) {
                outcome.unhandled_user_ids.push(user_id.clone());
                continue;
            }
            self.set(
                user_key(user_id),
                Value::Pointer(header.room_id.clone()),
                ttl,
            );
        }

        let entry = CacheEntry {
            header: header.clone(),
            invitee_user_ids: invitee_user_ids.to_vec(),
        };
        self.set(room_key(&header.room_id), Value::Room(entry), ttl);

        Ok(outcome)
    }

    async fn get_signal_invitation_info_by_room_id(
        &self,
        room_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        self.read_room(room_id)
    }

    async fn get_available_signal_invitation_info(
        &self,
        user_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        match self.get(&user_key(user_id)) {
            Some(Value::Pointer(room_id)) => self.read_room(&room_id),
            _ => Err(SignalError::InvitationExpired(user_key(user_id))),
        }
    }

    async fn del_user_signal(&self, user_id: &str) -> Result<(), SignalError> {
        self.slots.lock().unwrap().remove(&user_key(user_id));
        Ok(())
    }

    async fn del_room_signal(&self, room_id: &str) -> Result<(), SignalError> {
        self.slots.lock().unwrap().remove(&room_key(room_id));
        Ok(())
    }
}
