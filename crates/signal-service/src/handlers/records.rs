//! Call history handlers for audit and CMS use.
//!
//! - `POST /v1/signal/records` - Page invitation records
//! - `POST /v1/signal/records/delete` - Purge records by sid
//! - `POST /v1/signal/records/recording` - Attach recording details

use crate::errors::SignalError;
use crate::models::{Pagination, RecordFilter, SessionType, SignalRecord};
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// History query. Zero or empty fields are not applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordsRequest {
    #[serde(rename = "sessionType")]
    pub session_type: i32,
    #[serde(rename = "sendID")]
    pub send_id: String,
    #[serde(rename = "recvID")]
    pub recv_id: String,
    /// Unix seconds.
    #[serde(rename = "startTime")]
    pub start_time: i64,
    /// Unix seconds.
    #[serde(rename = "endTime")]
    pub end_time: i64,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordsResponse {
    pub total: i64,
    #[serde(rename = "signalRecords")]
    pub signal_records: Vec<SignalRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteRecordsRequest {
    pub sids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordingRequest {
    pub sid: String,
    #[serde(rename = "fileURL")]
    pub file_url: Option<String>,
    /// Unix seconds.
    #[serde(rename = "endTime")]
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

fn timestamp(field: &str, seconds: i64) -> Result<Option<DateTime<Utc>>, SignalError> {
    if seconds == 0 {
        return Ok(None);
    }
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(Some)
        .ok_or_else(|| SignalError::InvalidArgument(format!("{field} is out of range")))
}

impl RecordsRequest {
    fn filter(&self) -> Result<RecordFilter, SignalError> {
        let session_type = match self.session_type {
            0 => None,
            value => Some(
                SessionType::try_from(value).map_err(SignalError::InvalidArgument)?,
            ),
        };
        Ok(RecordFilter {
            session_type,
            send_id: self.send_id.clone(),
            recv_id: self.recv_id.clone(),
            start_time: timestamp("startTime", self.start_time)?,
            end_time: timestamp("endTime", self.end_time)?,
        })
    }
}

/// Handler for POST /v1/signal/records
#[instrument(skip_all, fields(send_id = %req.send_id, recv_id = %req.recv_id))]
pub async fn get_signal_invitation_records(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordsRequest>,
) -> Result<Json<RecordsResponse>, SignalError> {
    let filter = req.filter()?;
    let (total, signal_records) = state
        .engine
        .get_signal_invitation_records(&filter, req.pagination)
        .await?;
    Ok(Json(RecordsResponse {
        total,
        signal_records,
    }))
}

/// Handler for POST /v1/signal/records/delete
#[instrument(skip_all, fields(count = req.sids.len()))]
pub async fn delete_signal_records(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRecordsRequest>,
) -> Result<Json<Empty>, SignalError> {
    state.engine.delete_signal_records(&req.sids).await?;
    info!(target: "signal.handlers", count = req.sids.len(), "Signal records deleted");
    Ok(Json(Empty {}))
}

/// Handler for POST /v1/signal/records/recording
#[instrument(skip_all, fields(sid = %req.sid))]
pub async fn update_recording(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordingRequest>,
) -> Result<Json<Empty>, SignalError> {
    let end_time = match req.end_time {
        Some(seconds) => timestamp("endTime", seconds)?,
        None => None,
    };
    state
        .engine
        .update_recording(&req.sid, req.file_url.as_deref(), end_time)
        .await?;
    Ok(Json(Empty {}))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_records_request_defaults_to_unfiltered() {
        let req: RecordsRequest = serde_json::from_str("{}").unwrap();
        let filter = req.filter().unwrap();
        assert_eq!(filter, RecordFilter::default());
        assert_eq!(req.pagination, Pagination::default());
    }

    #[test]
    fn test_records_request_maps_filters() {
        let req: RecordsRequest = serde_json::from_value(serde_json::json!({
            "sessionType": 2,
            "sendID": "A",
            "startTime": 1_700_000_000,
            "pagination": {"pageNumber": 2, "showNumber": 5}
        }))
        .unwrap();
        let filter = req.filter().unwrap();

        assert_eq!(filter.session_type, Some(SessionType::Group));
        assert_eq!(filter.send_id, "A");
        assert_eq!(filter.start_time.unwrap().timestamp(), 1_700_000_000);
        assert!(filter.end_time.is_none());
        assert_eq!(req.pagination.offset(), 5);
    }

    #[test]
    fn test_unknown_session_type_is_invalid() {
        let req = RecordsRequest {
            session_type: 7,
            ..Default::default()
        };
        assert!(matches!(req.filter(), Err(SignalError::InvalidArgument(_))));
    }
}
