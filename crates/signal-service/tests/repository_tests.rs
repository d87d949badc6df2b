//! Signal repository integration tests.
//!
//! Exercises the cache-then-store ordering of `SignalRepository` against
//! the in-memory cache and store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use signal_service::cache::{room_key, user_key, InvitationCache};
use signal_service::errors::SignalError;
use signal_service::models::{InvitationHeader, InviteeStatus, StatusTransition};
use signal_service::repository::SignalRepository;
use signal_test_utils::*;
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (
    SignalRepository,
    Arc<InMemoryInvitationCache>,
    Arc<InMemoryInvitationStore>,
) {
    let cache = Arc::new(InMemoryInvitationCache::new());
    let store = Arc::new(InMemoryInvitationStore::new());
    let repository = SignalRepository::new(cache.clone(), store.clone());
    (repository, cache, store)
}

fn header(room_id: &str, sid: &str, invitees: &[&str]) -> (InvitationHeader, Vec<String>) {
    let info = invitation("A", invitees, room_id);
    (
        InvitationHeader::from_invitation(&info, None, sid),
        info.invitee_user_ids,
    )
}

#[tokio::test(start_paused = true)]
async fn test_unhandled_invitee_keeps_pointer_and_ttl() -> Result<(), anyhow::Error> {
    let (repository, cache, _) = setup();

    let (first, invitees) = header("r1", "RM_1", &["U"]);
    let outcome = repository.create_signal(&first, &invitees).await?;
    assert!(outcome.unhandled_user_ids.is_empty());

    tokio::time::advance(Duration::from_secs(10)).await;

    let (second, invitees) = header("r2", "RM_2", &["U", "V"]);
    let outcome = repository.create_signal(&second, &invitees).await?;
    assert_eq!(outcome.unhandled_user_ids, vec!["U".to_string()]);

    // U still points at the first room, on the first room's clock
    let entry = cache.get_available_signal_invitation_info("U").await?;
    assert_eq!(entry.header.room_id, "r1");
    let ttl = cache.ttl(&user_key("U")).unwrap();
    assert!(ttl <= Duration::from_secs(20));

    // V was free and points at the second room
    let entry = cache.get_available_signal_invitation_info("V").await?;
    assert_eq!(entry.header.room_id, "r2");
    Ok(())
}

#[tokio::test]
async fn test_create_signal_records_inviter_self_row() -> Result<(), anyhow::Error> {
    let (repository, _, store) = setup();
    let (header, invitees) = header("r1", "RM_1", &["B", "C"]);

    repository.create_signal(&header, &invitees).await?;

    for user_id in ["A", "B", "C"] {
        assert_eq!(store.status("RM_1", user_id), Some(InviteeStatus::Pending));
    }
    Ok(())
}

#[tokio::test]
async fn test_reinvite_resets_row_to_pending() -> Result<(), anyhow::Error> {
    let (repository, _, store) = setup();
    let (header, invitees) = header("r1", "RM_1", &["B"]);
    repository.create_signal(&header, &invitees).await?;
    repository.reject_signal_invitation("RM_1", "B").await?;
    assert_eq!(store.status("RM_1", "B"), Some(InviteeStatus::Rejected));

    repository.create_signal(&header, &invitees).await?;

    assert_eq!(store.status("RM_1", "B"), Some(InviteeStatus::Pending));
    assert_eq!(store.header_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_handle_clears_only_the_actor_pointer() -> Result<(), anyhow::Error> {
    let (repository, cache, _) = setup();
    let (header, invitees) = header("r1", "RM_1", &["B", "C"]);
    repository.create_signal(&header, &invitees).await?;

    let transition = repository.accept_signal_invitation("RM_1", "B").await?;

    assert_eq!(transition, StatusTransition::Transitioned);
    assert!(!cache.is_unhandled("B").await?);
    assert!(cache.is_unhandled("C").await?);
    assert!(cache.contains_key(&room_key("r1")));
    Ok(())
}

#[tokio::test]
async fn test_second_transition_reports_current_status() -> Result<(), anyhow::Error> {
    let (repository, _, store) = setup();
    let (header, invitees) = header("r1", "RM_1", &["B"]);
    repository.create_signal(&header, &invitees).await?;

    repository.accept_signal_invitation("RM_1", "B").await?;
    let again = repository.hung_up_signal_invitation("RM_1", "B").await?;

    assert_eq!(
        again,
        StatusTransition::AlreadyHandled(InviteeStatus::Accepted)
    );
    assert_eq!(store.status("RM_1", "B"), Some(InviteeStatus::Accepted));

    let missing = repository.reject_signal_invitation("RM_1", "Z").await?;
    assert_eq!(missing, StatusTransition::Missing);
    Ok(())
}

#[tokio::test]
async fn test_cancel_removes_room_entry() -> Result<(), anyhow::Error> {
    let (repository, _, store) = setup();
    let (header, invitees) = header("r1", "RM_1", &["B"]);
    repository.create_signal(&header, &invitees).await?;

    repository
        .cancel_signal_invitation("RM_1", "r1", "A")
        .await?;

    let lookup = repository.get_signal_invitation_info_by_room_id("r1").await;
    assert!(matches!(lookup, Err(SignalError::InvitationExpired(_))));
    assert_eq!(store.status("RM_1", "A"), Some(InviteeStatus::Cancelled));
    Ok(())
}

#[tokio::test]
async fn test_durable_failure_surfaces_after_cache_write() {
    let (repository, cache, store) = setup();
    let (header, invitees) = header("r1", "RM_1", &["B"]);
    store.fail_next_write();

    let result = repository.create_signal(&header, &invitees).await;

    assert!(matches!(result, Err(SignalError::Database(_))));
    assert!(cache.contains_key(&room_key("r1")));
    assert!(store.header("RM_1").is_none());
}
