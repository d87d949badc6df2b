//! Signal repository: cache plus durable store behind one contract.
//!
//! Ordering and failure policy:
//!
//! 1. `create_signal` writes the cache first, then the durable header and
//!    rows in one transaction. A durable failure does not roll the cache
//!    back; the caller sees the error and the cache entry expires on its TTL.
//! 2. Accept/Reject/HungUp delete the acting user's pointer before the
//!    status write.
//! 3. Cancel deletes the whole room entry, then records the canceller.
//! 4. Invitation lookups read the cache only. A miss is never read through.

use crate::cache::InvitationCache;
use crate::errors::SignalError;
use crate::models::{
    CacheEntry, CreateSignalOutcome, InvitationHeader, InviteeRow, InviteeStatus, Pagination,
    RecordFilter, SignalRecord, StatusTransition,
};
use crate::observability::metrics;
use crate::store::InvitationStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Composes the invitation cache and store.
#[derive(Clone)]
pub struct SignalRepository {
    cache: Arc<dyn InvitationCache>,
    store: Arc<dyn InvitationStore>,
}

impl SignalRepository {
    pub fn new(cache: Arc<dyn InvitationCache>, store: Arc<dyn InvitationStore>) -> Self {
        Self { cache, store }
    }

    /// Record a new invitation. The inviter gets a self-row alongside every invitee.
    #[instrument(skip_all, fields(room_id = %header.room_id, sid = %header.sid))]
    pub async fn create_signal(
        &self,
        header: &InvitationHeader,
        invitee_user_ids: &[String],
    ) -> Result<CreateSignalOutcome, SignalError> {
        let outcome = self
            .cache
            .create_signal_invite(header, invitee_user_ids)
            .await?;

        if !outcome.unhandled_user_ids.is_empty() {
            debug!(
                target: "signal.repository",
                room_id = %header.room_id,
                unhandled = ?outcome.unhandled_user_ids,
                "Invitees already hold an unhandled invitation"
            );
            metrics::record_unhandled_invitees(outcome.unhandled_user_ids.len());
        }

        let mut user_ids = Vec::with_capacity(invitee_user_ids.len() + 1);
        user_ids.push(header.inviter_user_id.clone());
        user_ids.extend_from_slice(invitee_user_ids);

        if let Err(e) = self
            .store
            .create_signal_with_invitations(header, &user_ids)
            .await
        {
            // Cache stays written; it self-expires after the invitation timeout
            error!(
                target: "signal.repository",
                error = %e,
                room_id = %header.room_id,
                sid = %header.sid,
                "Durable write failed after cache write"
            );
            return Err(e);
        }

        Ok(outcome)
    }

    #[instrument(skip_all, fields(sid = %sid, user_id = %user_id))]
    pub async fn accept_signal_invitation(
        &self,
        sid: &str,
        user_id: &str,
    ) -> Result<StatusTransition, SignalError> {
        self.handle_for_user(sid, user_id, InviteeStatus::Accepted)
            .await
    }

    #[instrument(skip_all, fields(sid = %sid, user_id = %user_id))]
    pub async fn reject_signal_invitation(
        &self,
        sid: &str,
        user_id: &str,
    ) -> Result<StatusTransition, SignalError> {
        self.handle_for_user(sid, user_id, InviteeStatus::Rejected)
            .await
    }

    #[instrument(skip_all, fields(sid = %sid, user_id = %user_id))]
    pub async fn hung_up_signal_invitation(
        &self,
        sid: &str,
        user_id: &str,
    ) -> Result<StatusTransition, SignalError> {
        self.handle_for_user(sid, user_id, InviteeStatus::HungUp)
            .await
    }

    /// Clear the room entry for every invitee, then record the canceller.
    #[instrument(skip_all, fields(sid = %sid, room_id = %room_id, user_id = %user_id))]
    pub async fn cancel_signal_invitation(
        &self,
        sid: &str,
        room_id: &str,
        user_id: &str,
    ) -> Result<StatusTransition, SignalError> {
        self.cache.del_room_signal(room_id).await?;
        self.store
            .handle_signal_invitation(sid, user_id, InviteeStatus::Cancelled)
            .await
    }

    async fn handle_for_user(
        &self,
        sid: &str,
        user_id: &str,
        status: InviteeStatus,
    ) -> Result<StatusTransition, SignalError> {
        self.cache.del_user_signal(user_id).await?;
        self.store
            .handle_signal_invitation(sid, user_id, status)
            .await
    }

    pub async fn find_invitee(
        &self,
        sid: &str,
        user_id: &str,
    ) -> Result<Option<InviteeRow>, SignalError> {
        self.store.find_invitee(sid, user_id).await
    }

    pub async fn get_signal_invitation_info_by_room_id(
        &self,
        room_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        self.cache
            .get_signal_invitation_info_by_room_id(room_id)
            .await
    }

    pub async fn get_available_signal_invitation_info(
        &self,
        user_id: &str,
    ) -> Result<CacheEntry, SignalError> {
        self.cache
            .get_available_signal_invitation_info(user_id)
            .await
    }

    /// Header of session `sid` in `room_id`: the cached entry when it
    /// belongs to the same session, otherwise the durable header.
    pub async fn get_signal_header(
        &self,
        room_id: &str,
        sid: &str,
    ) -> Result<InvitationHeader, SignalError> {
        match self.cache.get_signal_invitation_info_by_room_id(room_id).await {
            Ok(entry) if entry.header.sid == sid => return Ok(entry.header),
            Ok(_) | Err(SignalError::InvitationExpired(_)) => {}
            Err(e) => return Err(e),
        }
        self.store
            .find_signals(&[sid.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                SignalError::InvitationNotFound(format!("no invitation header for {sid}"))
            })
    }

    pub async fn update_signal_file_url(&self, sid: &str, file_url: &str) -> Result<(), SignalError> {
        self.store.update_file_url(sid, file_url).await
    }

    pub async fn update_signal_end_time(
        &self,
        sid: &str,
        end_time: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        self.store.update_end_time(sid, end_time).await
    }

    /// History for audit/CMS use.
    ///
    /// With no `recv_id` the sender path scans headers directly. With a
    /// `recv_id` the invitee rows are paged first and joined back to their
    /// headers, keeping the row order. Sids whose header is gone are skipped.
    #[instrument(skip_all, fields(send_id = %filter.send_id, recv_id = %filter.recv_id))]
    pub async fn get_signal_invitation_records(
        &self,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> Result<(i64, Vec<SignalRecord>), SignalError> {
        let (total, headers) = if filter.recv_id.is_empty() {
            self.store.page_signals(filter, pagination).await?
        } else {
            let (total, sids) = self
                .store
                .page_sids_by_recipient(
                    &filter.recv_id,
                    filter.start_time,
                    filter.end_time,
                    pagination,
                )
                .await?;

            let mut by_sid: HashMap<String, InvitationHeader> = self
                .store
                .find_signals(&sids)
                .await?
                .into_iter()
                .map(|header| (header.sid.clone(), header))
                .collect();

            let headers = sids.iter().filter_map(|sid| by_sid.remove(sid)).collect();
            (total, headers)
        };

        let mut records = Vec::with_capacity(headers.len());
        for header in headers {
            let invitees = self.store.find_invitees(&header.sid).await?;
            records.push(SignalRecord { header, invitees });
        }

        Ok((total, records))
    }

    #[instrument(skip_all, fields(count = sids.len()))]
    pub async fn delete_signal_records(&self, sids: &[String]) -> Result<(), SignalError> {
        self.store.delete_records(sids).await
    }
}
