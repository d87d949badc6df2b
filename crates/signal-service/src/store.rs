//! Durable invitation store.
//!
//! Two tables back the store:
//! - `signal_invitations` - one header per RTC room session, unique on `sid`
//! - `signal_invitees` - one status row per `(sid, user_id)`, inviter included
//!
//! Headers are never updated by the state machine; only status rows move.
//! A status row leaves `pending` exactly once.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)

use crate::errors::SignalError;
use crate::models::{
    InvitationHeader, InviteeRow, InviteeStatus, OfflinePushInfo, Pagination, RecordFilter,
    SessionType, StatusTransition,
};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Durable persistence of invitation headers and status rows.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Insert a header. Returns `false` if the `sid` already existed.
    async fn create_signal(&self, header: &InvitationHeader) -> Result<bool, SignalError>;

    /// Upsert a Pending row per user with a fresh initiate time.
    /// Empty and repeated user IDs are skipped.
    async fn upsert_invitation_rows(&self, sid: &str, user_ids: &[String])
        -> Result<(), SignalError>;

    /// Header insert plus row upsert in one transaction.
    async fn create_signal_with_invitations(
        &self,
        header: &InvitationHeader,
        user_ids: &[String],
    ) -> Result<(), SignalError>;

    /// Move one row out of Pending.
    async fn handle_signal_invitation(
        &self,
        sid: &str,
        user_id: &str,
        status: InviteeStatus,
    ) -> Result<StatusTransition, SignalError>;

    async fn find_invitee(&self, sid: &str, user_id: &str)
        -> Result<Option<InviteeRow>, SignalError>;

    async fn find_invitees(&self, sid: &str) -> Result<Vec<InviteeRow>, SignalError>;

    /// Headers for the given sids, in no particular order.
    async fn find_signals(&self, sids: &[String]) -> Result<Vec<InvitationHeader>, SignalError>;

    /// Sender-side history: headers matching the filter, newest first.
    /// `recv_id` in the filter is ignored here.
    async fn page_signals(
        &self,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> Result<(i64, Vec<InvitationHeader>), SignalError>;

    /// Recipient-side history: sids of rows for `recv_id`, newest first.
    async fn page_sids_by_recipient(
        &self,
        recv_id: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        pagination: Pagination,
    ) -> Result<(i64, Vec<String>), SignalError>;

    async fn update_file_url(&self, sid: &str, file_url: &str) -> Result<(), SignalError>;

    async fn update_end_time(&self, sid: &str, end_time: DateTime<Utc>)
        -> Result<(), SignalError>;

    /// Delete headers and their rows in one transaction.
    async fn delete_records(&self, sids: &[String]) -> Result<(), SignalError>;
}

/// PostgreSQL-backed `InvitationStore`.
#[derive(Clone)]
pub struct PgInvitationStore {
    pool: PgPool,
}

impl PgInvitationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const HEADER_COLUMNS: &str = "sid, room_id, inviter_user_id, custom_data, group_id, media_type, \
     platform_id, session_type, timeout_seconds, initiate_time, title, description, ex, \
     ios_push_sound, ios_badge_count, signal_info, file_url, end_time";

fn record_query<T>(
    operation: &'static str,
    start: Instant,
    result: Result<T, sqlx::Error>,
) -> Result<T, SignalError> {
    match result {
        Ok(value) => {
            metrics::record_db_query(operation, "success", start.elapsed());
            Ok(value)
        }
        Err(e) => {
            metrics::record_db_query(operation, "error", start.elapsed());
            warn!(target: "signal.store", error = %e, operation, "Query failed");
            Err(SignalError::Database(format!("{operation}: {e}")))
        }
    }
}

fn normalize_user_ids(user_ids: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(user_ids.len());
    for id in user_ids {
        if !id.is_empty() && seen.insert(id.as_str()) {
            out.push(id.clone());
        }
    }
    out
}

async fn insert_header<'e, E: PgExecutor<'e>>(
    executor: E,
    header: &InvitationHeader,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO signal_invitations (
            sid, room_id, inviter_user_id, custom_data, group_id, media_type,
            platform_id, session_type, timeout_seconds, initiate_time,
            title, description, ex, ios_push_sound, ios_badge_count, signal_info
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (sid) DO NOTHING
        "#,
    )
    .bind(&header.sid) // $1
    .bind(&header.room_id) // $2
    .bind(&header.inviter_user_id) // $3
    .bind(&header.custom_data) // $4
    .bind(&header.group_id) // $5
    .bind(header.media_type.as_str()) // $6
    .bind(header.platform_id) // $7
    .bind(header.session_type.as_i32()) // $8
    .bind(header.timeout_seconds) // $9
    .bind(header.initiate_time) // $10
    .bind(&header.push.title) // $11
    .bind(&header.push.desc) // $12
    .bind(&header.push.ex) // $13
    .bind(&header.push.ios_push_sound) // $14
    .bind(header.push.ios_badge_count) // $15
    .bind(&header.push.signal_info) // $16
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn upsert_rows<'e, E: PgExecutor<'e>>(
    executor: E,
    sid: &str,
    user_ids: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO signal_invitees (sid, user_id, status, initiate_time, handle_time)
        SELECT $1, u, 'pending', NOW(), 'epoch'::timestamptz
        FROM UNNEST($2::text[]) AS u
        ON CONFLICT (sid, user_id) DO UPDATE SET
            status = 'pending',
            initiate_time = EXCLUDED.initiate_time,
            handle_time = EXCLUDED.handle_time
        "#,
    )
    .bind(sid)
    .bind(user_ids)
    .execute(executor)
    .await?;

    Ok(())
}

/// Header plus rows in one transaction; a failure rolls back both.
async fn write_invitation(
    pool: &PgPool,
    header: &InvitationHeader,
    user_ids: &[String],
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let inserted = insert_header(&mut *tx, header).await?;
    if !user_ids.is_empty() {
        upsert_rows(&mut *tx, &header.sid, user_ids).await?;
    }
    tx.commit().await?;
    Ok(inserted)
}

async fn delete_all(pool: &PgPool, sids: &[String]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM signal_invitees WHERE sid = ANY($1)")
        .bind(sids)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM signal_invitations WHERE sid = ANY($1)")
        .bind(sids)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

fn map_row_to_header(row: &PgRow) -> Result<InvitationHeader, SignalError> {
    let media_type: String = row.try_get("media_type")?;
    let session_type: i32 = row.try_get("session_type")?;

    Ok(InvitationHeader {
        sid: row.try_get("sid")?,
        room_id: row.try_get("room_id")?,
        inviter_user_id: row.try_get("inviter_user_id")?,
        custom_data: row.try_get("custom_data")?,
        group_id: row.try_get("group_id")?,
        media_type: media_type.parse().map_err(SignalError::Internal)?,
        platform_id: row.try_get("platform_id")?,
        session_type: SessionType::try_from(session_type).map_err(SignalError::Internal)?,
        timeout_seconds: row.try_get("timeout_seconds")?,
        initiate_time: row.try_get("initiate_time")?,
        push: OfflinePushInfo {
            title: row.try_get("title")?,
            desc: row.try_get("description")?,
            ex: row.try_get("ex")?,
            ios_push_sound: row.try_get("ios_push_sound")?,
            ios_badge_count: row.try_get("ios_badge_count")?,
            signal_info: row.try_get("signal_info")?,
        },
        file_url: row.try_get("file_url")?,
        end_time: row.try_get("end_time")?,
    })
}

fn map_row_to_invitee(row: &PgRow) -> Result<InviteeRow, SignalError> {
    let status: String = row.try_get("status")?;
    Ok(InviteeRow {
        sid: row.try_get("sid")?,
        user_id: row.try_get("user_id")?,
        status: status.parse().map_err(SignalError::Internal)?,
        initiate_time: row.try_get("initiate_time")?,
        handle_time: row.try_get("handle_time")?,
    })
}

#[async_trait]
impl InvitationStore for PgInvitationStore {
    #[instrument(skip_all, fields(sid = %header.sid))]
    async fn create_signal(&self, header: &InvitationHeader) -> Result<bool, SignalError> {
        let start = Instant::now();
        let inserted = record_query("create_signal", start, insert_header(&self.pool, header).await)?;
        if !inserted {
            debug!(target: "signal.store", sid = %header.sid, "Header already recorded");
        }
        Ok(inserted)
    }

    #[instrument(skip_all, fields(sid = %sid, count = user_ids.len()))]
    async fn upsert_invitation_rows(
        &self,
        sid: &str,
        user_ids: &[String],
    ) -> Result<(), SignalError> {
        let user_ids = normalize_user_ids(user_ids);
        if user_ids.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        record_query(
            "upsert_invitation_rows",
            start,
            upsert_rows(&self.pool, sid, &user_ids).await,
        )
    }

    #[instrument(skip_all, fields(sid = %header.sid, count = user_ids.len()))]
    async fn create_signal_with_invitations(
        &self,
        header: &InvitationHeader,
        user_ids: &[String],
    ) -> Result<(), SignalError> {
        let start = Instant::now();
        let user_ids = normalize_user_ids(user_ids);

        let result = write_invitation(&self.pool, header, &user_ids).await;
        let inserted = record_query("create_signal_with_invitations", start, result)?;
        debug!(
            target: "signal.store",
            sid = %header.sid,
            header_inserted = inserted,
            rows = user_ids.len(),
            "Recorded invitation"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(sid = %sid, user_id = %user_id, status = %status))]
    async fn handle_signal_invitation(
        &self,
        sid: &str,
        user_id: &str,
        status: InviteeStatus,
    ) -> Result<StatusTransition, SignalError> {
        let start = Instant::now();

        let updated = record_query(
            "handle_signal_invitation",
            start,
            sqlx::query(
                r#"
                UPDATE signal_invitees
                SET status = $3, handle_time = NOW()
                WHERE sid = $1 AND user_id = $2 AND status = 'pending'
                "#,
            )
            .bind(sid)
            .bind(user_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await,
        )?;

        if updated.rows_affected() > 0 {
            return Ok(StatusTransition::Transitioned);
        }

        match self.find_invitee(sid, user_id).await? {
            Some(row) => {
                debug!(
                    target: "signal.store",
                    sid = %sid,
                    user_id = %user_id,
                    current = %row.status,
                    "Row already handled"
                );
                Ok(StatusTransition::AlreadyHandled(row.status))
            }
            None => Ok(StatusTransition::Missing),
        }
    }

    #[instrument(skip_all, fields(sid = %sid, user_id = %user_id))]
    async fn find_invitee(
        &self,
        sid: &str,
        user_id: &str,
    ) -> Result<Option<InviteeRow>, SignalError> {
        let start = Instant::now();
        let row = record_query(
            "find_invitee",
            start,
            sqlx::query(
                r#"
                SELECT sid, user_id, status, initiate_time, handle_time
                FROM signal_invitees
                WHERE sid = $1 AND user_id = $2
                "#,
            )
            .bind(sid)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await,
        )?;

        row.as_ref().map(map_row_to_invitee).transpose()
    }

    #[instrument(skip_all, fields(sid = %sid))]
    async fn find_invitees(&self, sid: &str) -> Result<Vec<InviteeRow>, SignalError> {
        let start = Instant::now();
        let rows = record_query(
            "find_invitees",
            start,
            sqlx::query(
                r#"
                SELECT sid, user_id, status, initiate_time, handle_time
                FROM signal_invitees
                WHERE sid = $1
                ORDER BY initiate_time, user_id
                "#,
            )
            .bind(sid)
            .fetch_all(&self.pool)
            .await,
        )?;

        rows.iter().map(map_row_to_invitee).collect()
    }

    #[instrument(skip_all, fields(count = sids.len()))]
    async fn find_signals(&self, sids: &[String]) -> Result<Vec<InvitationHeader>, SignalError> {
        if sids.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let rows = record_query(
            "find_signals",
            start,
            sqlx::query(&format!(
                "SELECT {HEADER_COLUMNS} FROM signal_invitations WHERE sid = ANY($1)"
            ))
            .bind(sids)
            .fetch_all(&self.pool)
            .await,
        )?;

        rows.iter().map(map_row_to_header).collect()
    }

    #[instrument(skip_all, fields(send_id = %filter.send_id))]
    async fn page_signals(
        &self,
        filter: &RecordFilter,
        pagination: Pagination,
    ) -> Result<(i64, Vec<InvitationHeader>), SignalError> {
        const WHERE_CLAUSE: &str = r#"
            WHERE ($1::timestamptz IS NULL OR initiate_time >= $1)
              AND ($2::timestamptz IS NULL OR initiate_time <= $2)
              AND ($3::integer IS NULL OR session_type = $3)
              AND ($4::text = '' OR inviter_user_id = $4)
        "#;
        let session_type = filter.session_type.map(SessionType::as_i32);
        let start = Instant::now();

        let total: i64 = record_query(
            "count_signals",
            start,
            sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM signal_invitations {WHERE_CLAUSE}"
            ))
            .bind(filter.start_time)
            .bind(filter.end_time)
            .bind(session_type)
            .bind(&filter.send_id)
            .fetch_one(&self.pool)
            .await,
        )?;

        let start = Instant::now();
        let rows = record_query(
            "page_signals",
            start,
            sqlx::query(&format!(
                "SELECT {HEADER_COLUMNS} FROM signal_invitations {WHERE_CLAUSE} \
                 ORDER BY initiate_time DESC, sid LIMIT $5 OFFSET $6"
            ))
            .bind(filter.start_time)
            .bind(filter.end_time)
            .bind(session_type)
            .bind(&filter.send_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await,
        )?;

        let headers = rows
            .iter()
            .map(map_row_to_header)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((total, headers))
    }

    #[instrument(skip_all, fields(recv_id = %recv_id))]
    async fn page_sids_by_recipient(
        &self,
        recv_id: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        pagination: Pagination,
    ) -> Result<(i64, Vec<String>), SignalError> {
        const WHERE_CLAUSE: &str = r#"
            WHERE user_id = $1
              AND ($2::timestamptz IS NULL OR initiate_time >= $2)
              AND ($3::timestamptz IS NULL OR initiate_time <= $3)
        "#;
        let start = Instant::now();

        let total: i64 = record_query(
            "count_sids_by_recipient",
            start,
            sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM signal_invitees {WHERE_CLAUSE}"
            ))
            .bind(recv_id)
            .bind(start_time)
            .bind(end_time)
            .fetch_one(&self.pool)
            .await,
        )?;

        let start = Instant::now();
        let sids: Vec<String> = record_query(
            "page_sids_by_recipient",
            start,
            sqlx::query_scalar(&format!(
                "SELECT sid FROM signal_invitees {WHERE_CLAUSE} \
                 ORDER BY initiate_time DESC, sid LIMIT $4 OFFSET $5"
            ))
            .bind(recv_id)
            .bind(start_time)
            .bind(end_time)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await,
        )?;

        Ok((total, sids))
    }

    #[instrument(skip_all, fields(sid = %sid))]
    async fn update_file_url(&self, sid: &str, file_url: &str) -> Result<(), SignalError> {
        let start = Instant::now();
        record_query(
            "update_file_url",
            start,
            sqlx::query("UPDATE signal_invitations SET file_url = $2 WHERE sid = $1")
                .bind(sid)
                .bind(file_url)
                .execute(&self.pool)
                .await,
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(sid = %sid))]
    async fn update_end_time(
        &self,
        sid: &str,
        end_time: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        let start = Instant::now();
        record_query(
            "update_end_time",
            start,
            sqlx::query("UPDATE signal_invitations SET end_time = $2 WHERE sid = $1")
                .bind(sid)
                .bind(end_time)
                .execute(&self.pool)
                .await,
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = sids.len()))]
    async fn delete_records(&self, sids: &[String]) -> Result<(), SignalError> {
        if sids.is_empty() {
            return Ok(());
        }
        let start = Instant::now();

        record_query("delete_records", start, delete_all(&self.pool, sids).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_user_ids_drops_empty_and_repeats() {
        let ids = vec![
            "A".to_string(),
            String::new(),
            "B".to_string(),
            "A".to_string(),
        ];
        assert_eq!(normalize_user_ids(&ids), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_record_query_maps_errors() {
        let result: Result<(), SignalError> =
            record_query("find_invitee", Instant::now(), Err(sqlx::Error::RowNotFound));
        assert!(matches!(result, Err(SignalError::Database(ref msg)) if msg.starts_with("find_invitee")));
    }
}
