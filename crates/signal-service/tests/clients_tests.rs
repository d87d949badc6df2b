//! User directory and messaging relay client tests against wiremock peers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use secrecy::SecretString;
use signal_service::clients::{
    HttpMessagingRelay, HttpUserDirectory, MessagingRelay, UserDirectory,
};
use signal_service::errors::SignalError;
use signal_service::models::SessionType;
use signal_service::notification::{NotificationAssembler, Route};
use signal_test_utils::invitation;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn directory(server: &MockServer) -> HttpUserDirectory {
    HttpUserDirectory::with_timeout(
        format!("{}/", server.uri()),
        Some(SecretString::from("peer-token")),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn relay(server: &MockServer) -> HttpMessagingRelay {
    HttpMessagingRelay::with_timeout(server.uri(), None, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_user_lookup_sends_token_and_finds_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/get_users_info"))
        .and(header("token", "peer-token"))
        .and(body_partial_json(serde_json::json!({"userIDs": ["B"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errCode": 0,
            "errMsg": "",
            "data": {"usersInfo": [{"userID": "B", "nickname": "Bob", "account": "bob"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let user = directory(&server).get_user_info("B").await.unwrap();

    assert_eq!(user.user_id, "B");
    assert_eq!(user.nickname, "Bob");
    assert_eq!(user.account, "bob");
}

#[tokio::test]
async fn test_user_lookup_with_empty_result_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/get_users_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errCode": 0,
            "data": {"usersInfo": []}
        })))
        .mount(&server)
        .await;

    let result = directory(&server).get_user_info("Z").await;

    assert!(matches!(result, Err(SignalError::UserNotFound(_))));
}

#[tokio::test]
async fn test_user_lookup_peer_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/get_users_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errCode": 1002,
            "errMsg": "no permission"
        })))
        .mount(&server)
        .await;

    let result = directory(&server).get_user_info("B").await;

    assert!(matches!(result, Err(SignalError::UserDirectory(_))));
}

#[tokio::test]
async fn test_relay_posts_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/msg/send_msg"))
        .and(body_partial_json(serde_json::json!({
            "msgData": {
                "sendID": "A",
                "recvID": "B",
                "contentType": 1601,
                "sessionType": 1,
                "msgFrom": 100,
                "options": {"history": false, "senderSync": true, "offlinePush": true}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errCode": 0,
            "data": {"serverMsgID": "srv-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let call = invitation("A", &["B"], "r1");
    assert_eq!(call.session_type, SessionType::Single);
    let envelope = NotificationAssembler::new()
        .signaling(Route::direct("A", "B", &call), &call, None)
        .unwrap();

    relay(&server).send(&envelope).await.unwrap();
}

#[tokio::test]
async fn test_relay_http_failure_is_relay_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/msg/send_msg"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let call = invitation("A", &["B"], "r1");
    let envelope = NotificationAssembler::new()
        .signaling(Route::direct("A", "B", &call), &call, None)
        .unwrap();

    let result = relay(&server).send(&envelope).await;

    assert!(matches!(result, Err(SignalError::Relay(_))));
}
