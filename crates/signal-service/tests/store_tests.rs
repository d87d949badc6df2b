//! PostgreSQL invitation store tests.
//!
//! Each test gets an isolated database with migrations applied.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, TimeZone, Utc};
use signal_service::models::{
    InvitationHeader, InviteeStatus, Pagination, RecordFilter, SessionType, StatusTransition,
};
use signal_service::store::{InvitationStore, PgInvitationStore};
use signal_test_utils::{group_invitation, invitation, push_info};
use sqlx::PgPool;

fn ids(user_ids: &[&str]) -> Vec<String> {
    user_ids.iter().map(|id| (*id).to_string()).collect()
}

fn header_at(sid: &str, inviter: &str, seconds: i64) -> InvitationHeader {
    let mut info = invitation(inviter, &["B"], &format!("room-{sid}"));
    info.initiate_time = seconds;
    InvitationHeader::from_invitation(&info, Some(&push_info("call")), sid)
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_header_insert_is_once_per_sid(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    let header = header_at("RM_1", "A", 1_700_000_000);

    assert!(store.create_signal(&header).await?);
    assert!(!store.create_signal(&header).await?);

    let found = store.find_signals(&ids(&["RM_1"])).await?;
    assert_eq!(found, vec![header]);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_invitation_write_dedups_rows(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    let header = header_at("RM_1", "A", 1_700_000_000);

    store
        .create_signal_with_invitations(&header, &ids(&["A", "B", "", "B"]))
        .await?;

    let rows = store.find_invitees("RM_1").await?;
    let users: Vec<&str> = rows.iter().map(|row| row.user_id.as_str()).collect();
    assert_eq!(users.len(), 2);
    assert!(users.contains(&"A") && users.contains(&"B"));
    assert!(rows.iter().all(|row| row.status == InviteeStatus::Pending));
    assert!(rows.iter().all(|row| !row.is_handled()));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_row_leaves_pending_exactly_once(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    let header = header_at("RM_1", "A", 1_700_000_000);
    store
        .create_signal_with_invitations(&header, &ids(&["A", "B"]))
        .await?;

    let first = store
        .handle_signal_invitation("RM_1", "B", InviteeStatus::Accepted)
        .await?;
    let second = store
        .handle_signal_invitation("RM_1", "B", InviteeStatus::Rejected)
        .await?;
    let missing = store
        .handle_signal_invitation("RM_1", "Z", InviteeStatus::Rejected)
        .await?;

    assert_eq!(first, StatusTransition::Transitioned);
    assert_eq!(
        second,
        StatusTransition::AlreadyHandled(InviteeStatus::Accepted)
    );
    assert_eq!(missing, StatusTransition::Missing);

    let row = store.find_invitee("RM_1", "B").await?.unwrap();
    assert_eq!(row.status, InviteeStatus::Accepted);
    assert!(row.is_handled());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_upsert_resets_handled_row(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    let header = header_at("RM_1", "A", 1_700_000_000);
    store
        .create_signal_with_invitations(&header, &ids(&["A", "B"]))
        .await?;
    store
        .handle_signal_invitation("RM_1", "B", InviteeStatus::Rejected)
        .await?;

    store.upsert_invitation_rows("RM_1", &ids(&["B"])).await?;

    let row = store.find_invitee("RM_1", "B").await?.unwrap();
    assert_eq!(row.status, InviteeStatus::Pending);
    assert!(!row.is_handled());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sender_history_filters_and_pages(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    let base = 1_700_000_000;
    for (i, sid) in ["RM_1", "RM_2", "RM_3"].iter().enumerate() {
        let header = header_at(sid, "A", base + i as i64 * 60);
        store.create_signal(&header).await?;
    }
    let mut group = group_invitation("C", &["A"], "g1");
    group.initiate_time = base;
    store
        .create_signal(&InvitationHeader::from_invitation(&group, None, "RM_G"))
        .await?;

    let by_a = RecordFilter {
        send_id: "A".to_string(),
        ..Default::default()
    };
    let page = Pagination {
        page_number: 1,
        show_number: 2,
    };
    let (total, headers) = store.page_signals(&by_a, page).await?;
    assert_eq!(total, 3);
    let sids: Vec<&str> = headers.iter().map(|h| h.sid.as_str()).collect();
    assert_eq!(sids, vec!["RM_3", "RM_2"]);

    let groups = RecordFilter {
        session_type: Some(SessionType::SuperGroup),
        ..Default::default()
    };
    let (total, headers) = store.page_signals(&groups, Pagination::default()).await?;
    assert_eq!(total, 1);
    assert_eq!(headers.first().unwrap().group_id, "g1");

    let window = RecordFilter {
        start_time: Utc.timestamp_opt(base + 30, 0).single(),
        end_time: Utc.timestamp_opt(base + 90, 0).single(),
        ..Default::default()
    };
    let (total, headers) = store.page_signals(&window, Pagination::default()).await?;
    assert_eq!(total, 1);
    assert_eq!(headers.first().unwrap().sid, "RM_2");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_recipient_history(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    store
        .create_signal_with_invitations(&header_at("RM_1", "A", 1_700_000_000), &ids(&["A", "B"]))
        .await?;
    store
        .create_signal_with_invitations(&header_at("RM_2", "C", 1_700_000_100), &ids(&["C", "B"]))
        .await?;

    let (total, sids) = store
        .page_sids_by_recipient("B", None, None, Pagination::default())
        .await?;
    assert_eq!(total, 2);
    assert_eq!(sids.len(), 2);

    let future = Utc::now() + Duration::hours(1);
    let (total, sids) = store
        .page_sids_by_recipient("B", Some(future), None, Pagination::default())
        .await?;
    assert_eq!(total, 0);
    assert!(sids.is_empty());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_recording_fields_and_delete(pool: PgPool) -> Result<(), anyhow::Error> {
    let store = PgInvitationStore::new(pool);
    store
        .create_signal_with_invitations(&header_at("RM_1", "A", 1_700_000_000), &ids(&["A", "B"]))
        .await?;
    let ended = Utc.timestamp_opt(1_700_000_600, 0).single().unwrap();

    store.update_file_url("RM_1", "https://files.test/1.mp4").await?;
    store.update_end_time("RM_1", ended).await?;

    let header = store.find_signals(&ids(&["RM_1"])).await?.pop().unwrap();
    assert_eq!(header.file_url.as_deref(), Some("https://files.test/1.mp4"));
    assert_eq!(header.end_time, Some(ended));
    assert_eq!(header.push.title, "call");

    store.delete_records(&ids(&["RM_1"])).await?;
    assert!(store.find_signals(&ids(&["RM_1"])).await?.is_empty());
    assert!(store.find_invitees("RM_1").await?.is_empty());
    Ok(())
}
