//! Ephemeral invitation cache.
//!
//! # Key Patterns
//!
//! - `SIGNAL:{roomID}` - JSON `CacheEntry` (header plus full invitee roster)
//! - `USER_SIGNAL:{userID}` - roomID of the user's unacknowledged invitation
//!
//! Both keys carry a TTL equal to the invitation timeout, so unanswered
//! invitations disappear without a reaper. A miss means "expired or never
//! cached" and is reported as `SignalError::InvitationExpired`.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently; each operation clones it.

use crate::errors::SignalError;
use crate::models::{CacheEntry, CreateSignalOutcome, InvitationHeader};
use crate::observability::metrics;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

const ROOM_KEY_PREFIX: &str = "SIGNAL:";
const USER_KEY_PREFIX: &str = "USER_SIGNAL:";

/// Cache key holding the room's invitation entry.
pub fn room_key(room_id: &str) -> String {
    format!("{ROOM_KEY_PREFIX}{room_id}")
}

/// Cache key pointing a user at their pending invitation's room.
pub fn user_key(user_id: &str) -> String {
    format!("{USER_KEY_PREFIX}{user_id}")
}

/// TTL-keyed index of live invitations.
#[async_trait]
pub trait InvitationCache: Send + Sync {
    /// True if the user already holds an unacknowledged invitation pointer.
    async fn is_unhandled(&self, user_id: &str) -> Result<bool, SignalError>;

    /// Write the room entry and one pointer per invitee that is not already
    /// unhandled. Unhandled invitees are reported and their pointer (and its
    /// TTL) is left alone. All writes go out as one batch.
    async fn create_signal_invite(
        &self,
        header: &InvitationHeader,
        invitee_user_ids: &[String],
    ) -> Result<CreateSignalOutcome, SignalError>;

    async fn get_signal_invitation_info_by_room_id(
        &self,
        room_id: &str,
    ) -> Result<CacheEntry, SignalError>;

    /// Follow the user's pointer to the room entry.
    async fn get_available_signal_invitation_info(
        &self,
        user_id: &str,
    ) -> Result<CacheEntry, SignalError>;

    async fn del_user_signal(&self, user_id: &str) -> Result<(), SignalError>;

    async fn del_room_signal(&self, room_id: &str) -> Result<(), SignalError>;
}

/// Redis-backed `InvitationCache`.
#[derive(Clone)]
pub struct RedisInvitationCache {
    connection: MultiplexedConnection,
}

impl RedisInvitationCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `SignalError::Redis` if the client cannot be opened or connected.
    pub async fn connect(redis_url: &str) -> Result<Self, SignalError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may contain credentials
            error!(target: "signal.cache", error = %e, "Failed to open Redis client");
            SignalError::Redis(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "signal.cache", error = %e, "Failed to connect to Redis");
                SignalError::Redis(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { connection })
    }

    async fn read_room(
        &self,
        conn: &mut MultiplexedConnection,
        room_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        let raw: Option<String> = conn.get(room_key(room_id)).await.map_err(|e| {
            warn!(target: "signal.cache", error = %e, room_id = %room_id, "Failed to read room entry");
            SignalError::Redis(format!("Failed to read room entry: {e}"))
        })?;

        let raw = raw.ok_or_else(|| SignalError::InvitationExpired(room_key(room_id)))?;

        serde_json::from_str(&raw).map_err(|e| {
            error!(target: "signal.cache", error = %e, room_id = %room_id, "Corrupt room entry");
            SignalError::Serialization(format!("Corrupt room entry: {e}"))
        })
    }
}

/// Redis `SET EX` needs a positive TTL.
fn ttl_seconds(timeout_seconds: i32) -> u64 {
    u64::try_from(timeout_seconds).unwrap_or(0).max(1)
}

#[async_trait]
impl InvitationCache for RedisInvitationCache {
    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn is_unhandled(&self, user_id: &str) -> Result<bool, SignalError> {
        let mut conn = self.connection.clone();
        conn.exists(user_key(user_id)).await.map_err(|e| {
            warn!(target: "signal.cache", error = %e, user_id = %user_id, "Failed to check user pointer");
            SignalError::Redis(format!("Failed to check user pointer: {e}"))
        })
    }

    #[instrument(skip_all, fields(room_id = %header.room_id, sid = %header.sid))]
    async fn create_signal_invite(
        &self,
        header: &InvitationHeader,
        invitee_user_ids: &[String],
    ) -> Result<CreateSignalOutcome, SignalError> {
        let start = Instant::now();
        let entry = CacheEntry {
            header: header.clone(),
            invitee_user_ids: invitee_user_ids.to_vec(),
        };
        let payload = serde_json::to_string(&entry)?;
        let ttl = ttl_seconds(header.timeout_seconds);

        // Check-then-set is not atomic across invitees; concurrent invites
        // naming the same user may both see "not unhandled".
        let mut outcome = CreateSignalOutcome::default();
        let mut pipe = redis::pipe();
        for user_id in invitee_user_ids {
            if self.is_unhandled(user_id).await.unwrap_or(false) {
                outcome.unhandled_user_ids.push(user_id.clone());
                continue;
            }
            pipe.set_ex(user_key(user_id), &header.room_id, ttl).ignore();
        }
        pipe.set_ex(room_key(&header.room_id), payload, ttl).ignore();

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(|e| {
            warn!(
                target: "signal.cache",
                error = %e,
                room_id = %header.room_id,
                "Failed to write invitation batch"
            );
            SignalError::Redis(format!("Failed to write invitation batch: {e}"))
        })?;

        metrics::record_redis_latency("create_signal_invite", start.elapsed());
        debug!(
            target: "signal.cache",
            room_id = %header.room_id,
            ttl_seconds = ttl,
            unhandled = outcome.unhandled_user_ids.len(),
            "Cached invitation"
        );

        Ok(outcome)
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn get_signal_invitation_info_by_room_id(
        &self,
        room_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        let start = Instant::now();
        let mut conn = self.connection.clone();
        let entry = self.read_room(&mut conn, room_id).await;
        metrics::record_redis_latency("get_room_entry", start.elapsed());
        entry
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn get_available_signal_invitation_info(
        &self,
        user_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        let start = Instant::now();
        let mut conn = self.connection.clone();

        let room_id: Option<String> = conn.get(user_key(user_id)).await.map_err(|e| {
            warn!(target: "signal.cache", error = %e, user_id = %user_id, "Failed to read user pointer");
            SignalError::Redis(format!("Failed to read user pointer: {e}"))
        })?;
        let room_id = room_id.ok_or_else(|| SignalError::InvitationExpired(user_key(user_id)))?;

        let entry = self.read_room(&mut conn, &room_id).await;
        metrics::record_redis_latency("get_user_entry", start.elapsed());
        entry
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn del_user_signal(&self, user_id: &str) -> Result<(), SignalError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(user_key(user_id)).await.map_err(|e| {
            warn!(target: "signal.cache", error = %e, user_id = %user_id, "Failed to delete user pointer");
            SignalError::Redis(format!("Failed to delete user pointer: {e}"))
        })?;
        Ok(())
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn del_room_signal(&self, room_id: &str) -> Result<(), SignalError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(room_key(room_id)).await.map_err(|e| {
            warn!(target: "signal.cache", error = %e, room_id = %room_id, "Failed to delete room entry");
            SignalError::Redis(format!("Failed to delete room entry: {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(room_key("r1"), "SIGNAL:r1");
        assert_eq!(user_key("B"), "USER_SIGNAL:B");
    }

    #[test]
    fn test_ttl_is_always_positive() {
        assert_eq!(ttl_seconds(30), 30);
        assert_eq!(ttl_seconds(0), 1);
        assert_eq!(ttl_seconds(-5), 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisInvitationCache::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(SignalError::Redis(_))));
    }
}
