//! In-memory invitation store.
//!
//! Follows the PostgreSQL store's rules: headers insert once per `sid`,
//! upserts reset a row to pending, and a row leaves pending exactly once.
//! History paging orders newest first with `sid` as the tie-breaker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signal_service::errors::SignalError;
use signal_service::models::{
    InvitationHeader, InviteeRow, InviteeStatus, Pagination, RecordFilter, StatusTransition,
};
use signal_service::store::InvitationStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    headers: HashMap<String, InvitationHeader>,
    rows: Vec<InviteeRow>,
}

/// In-memory `InvitationStore`.
#[derive(Debug, Default)]
pub struct InMemoryInvitationStore {
    tables: Mutex<Tables>,
    fail_next_write: AtomicBool,
}

impl InMemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_signal_with_invitations` fail with a database error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    pub fn header(&self, sid: &str) -> Option<InvitationHeader> {
        self.tables.lock().unwrap().headers.get(sid).cloned()
    }

    pub fn header_count(&self) -> usize {
        self.tables.lock().unwrap().headers.len()
    }

    /// Current status of `(sid, user_id)`.
    pub fn status(&self, sid: &str, user_id: &str) -> Option<InviteeStatus> {
        self.tables
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|row| row.sid == sid && row.user_id == user_id)
            .map(|row| row.status)
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn in_range(
    at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
) -> bool {
    start_time.map_or(true, |start| at >= start) && end_time.map_or(true, |end| at <= end)
}

fn page<T>(items: Vec<T>, pagination: Pagination) -> Vec<T> {
    let offset = usize::try_from(pagination.offset()).unwrap_or(0);
    let limit = usize::try_from(pagination.limit()).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}

impl Tables {
    fn upsert(&mut self, sid: &str, user_ids: &[String]) {
        let now = Utc::now();
        let mut seen = HashSet::new();
        for user_id in user_ids {
            if user_id.is_empty() || !seen.insert(user_id.as_str()) {
                continue;
            }
            match self
                .rows
                .iter_mut()
                .find(|row| row.sid == sid && row.user_id == *user_id)
            {
                Some(row) => {
                    row.status = InviteeStatus::Pending;
                    row.initiate_time = now;
                    row.handle_time = epoch();
                }
                None => self.rows.push(InviteeRow {
                    sid: sid.to_string(),
                    user_id: user_id.clone(),
                    status: InviteeStatus::Pending,
                    initiate_time: now,
                    handle_time: epoch(),
                }),
            }
        }
    }

    fn insert_header(&mut self, header: &InvitationHeader) -> bool {
        if self.headers.contains_key(&header.sid) {
            return false;
        }
        self.headers.insert(header.sid.clone(), header.clone());
        true
    }
}

#[async_trait]
impl InvitationStore for InMemoryInvitationStore {
    async fn create_signal(&self, header: &InvitationHeader) -> Result<bool, SignalError> {
        Ok(self.tables.lock().unwrap().insert_header(header))
    }

    async fn upsert_invitation_rows(
        &self,
        sid: &str,
        user_ids: &[String],
    ) -> Result<(), SignalError> {
        self.tables.lock().unwrap().upsert(sid, user_ids);
        Ok(())
    }

    async fn create_signal_with_invitations(
        &self,
        header: &InvitationHeader,
        user_ids: &[String],
    ) -> Result<(), SignalError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(SignalError::Database(
                "create_signal_with_invitations: injected failure".to_string(),
            ));
        }
        let mut tables = self.tables.lock().unwrap();
        tables.insert_header(header);
        tables.upsert(&header.sid, user_ids);
        Ok(())
    }

    async fn handle_signal_invitation(
        &self,
        sid: &str,
        user_id: &str,
        status: InviteeStatus,
    ) -> Result<StatusTransition, SignalError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(row) = tables
            .rows
            .iter_mut()
            .find(|row| row.sid == sid && row.user_id == user_id)
        else {
            return Ok(StatusTransition::Missing);
        };

        if row.status.is_terminal() {
            return Ok(StatusTransition::AlreadyHandled(row.status));
        }
        row.status = status;
        row.handle_time = Utc::now();
        Ok(StatusTransition::Transitioned)
    }

    async fn find_invitee(
        &self,
        sid: &str,
        user_id: &str,
    ) -> Result<Option<InviteeRow>, SignalError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|row| row.sid == sid && row.user_id == user_id)
            .cloned())
    }

    async fn find_invitees(&self, sid: &str) -> Result<Vec<InviteeRow>, SignalError> {
        let mut rows: Vec<InviteeRow> = self
            .tables
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|row| row.sid == sid)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.initiate_time
                .cmp(&b.initiate_time)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(rows)
    }

    async fn find_signals(&self, sids: &[String]) -> Result<Vec<InvitationHeader>, SignalError> {
        let tables = self.tables.lock().unwrap();
        Ok(sids
            .iter()
            .filter_map(|sid| tables.headers.get(sid).cloned())
            .collect())
    }

    async fn page_signals(
        &self,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> Result<(i64, Vec<InvitationHeader>), SignalError> {
        let mut headers: Vec<InvitationHeader> = self
            .tables
            .lock()
            .unwrap()
            .headers
            .values()
            .filter(|h| in_range(h.initiate_time, filter.start_time, filter.end_time))
            .filter(|h| filter.session_type.map_or(true, |t| h.session_type == t))
            .filter(|h| filter.send_id.is_empty() || h.inviter_user_id == filter.send_id)
            .cloned()
            .collect();
        headers.sort_by(|a, b| {
            b.initiate_time
                .cmp(&a.initiate_time)
                .then_with(|| a.sid.cmp(&b.sid))
        });

        let total = i64::try_from(headers.len()).unwrap_or(i64::MAX);
        Ok((total, page(headers, pagination)))
    }

    async fn page_sids_by_recipient(
        &self,
        recv_id: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        pagination: Pagination,
    ) -> Result<(i64, Vec<String>), SignalError> {
        let mut rows: Vec<InviteeRow> = self
            .tables
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|row| row.user_id == recv_id)
            .filter(|row| in_range(row.initiate_time, start_time, end_time))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.initiate_time
                .cmp(&a.initiate_time)
                .then_with(|| a.sid.cmp(&b.sid))
        });

        let total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        let sids = rows.into_iter().map(|row| row.sid).collect();
        Ok((total, page(sids, pagination)))
    }

    async fn update_file_url(&self, sid: &str, file_url: &str) -> Result<(), SignalError> {
        if let Some(header) = self.tables.lock().unwrap().headers.get_mut(sid) {
            header.file_url = Some(file_url.to_string());
        }
        Ok(())
    }

    async fn update_end_time(
        &self,
        sid: &str,
        end_time: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        if let Some(header) = self.tables.lock().unwrap().headers.get_mut(sid) {
            header.end_time = Some(end_time);
        }
        Ok(())
    }

    async fn delete_records(&self, sids: &[String]) -> Result<(), SignalError> {
        let mut tables = self.tables.lock().unwrap();
        for sid in sids {
            tables.headers.remove(sid);
        }
        tables.rows.retain(|row| !sids.contains(&row.sid));
        Ok(())
    }
}
