//! Test harness wiring the real engine and router onto in-memory fakes.
//!
//! Provides `SignalHarness` for engine-level tests and `spawn` for E2E
//! tests over a real socket.

use crate::fake_clients::{RecordingRelay, StaticUserDirectory};
use crate::fake_provider::FakeRoomProvider;
use crate::memory_cache::InMemoryInvitationCache;
use crate::memory_store::InMemoryInvitationStore;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::digest::{digest, SHA256};
use secrecy::SecretString;
use signal_service::engine::SignalingEngine;
use signal_service::repository::SignalRepository;
use signal_service::routes::{self, AppState};
use signal_service::rtc::webhook::WebhookReceiver;
use signal_service::rtc::RoomOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TEST_DEFAULT_TIMEOUT_SECONDS: i32 = 60;
pub const TEST_WEBHOOK_API_KEY: &str = "test-api-key";
pub const TEST_WEBHOOK_API_SECRET: &str = "test-api-secret-test-api-secret!";

/// Users every harness knows about.
pub const TEST_USERS: [(&str, &str); 4] = [("A", "Alice"), ("B", "Bob"), ("C", "Carol"), ("D", "Dave")];

/// Engine plus handles to every fake behind it.
///
/// # Example
/// ```rust,ignore
/// let harness = SignalHarness::new();
/// harness.engine.assemble(invite("A", &["B"], "r1")).await?;
/// assert_eq!(harness.provider.create_calls(), 1);
/// ```
pub struct SignalHarness {
    pub cache: Arc<InMemoryInvitationCache>,
    pub store: Arc<InMemoryInvitationStore>,
    pub provider: Arc<FakeRoomProvider>,
    pub users: Arc<StaticUserDirectory>,
    pub relay: Arc<RecordingRelay>,
    pub engine: SignalingEngine,
}

impl Default for SignalHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHarness {
    pub fn new() -> Self {
        let cache = Arc::new(InMemoryInvitationCache::new());
        let store = Arc::new(InMemoryInvitationStore::new());
        let provider = Arc::new(FakeRoomProvider::new());
        let users = Arc::new(StaticUserDirectory::new());
        for (user_id, nickname) in TEST_USERS {
            users.add_user(user_id, nickname);
        }
        let relay = Arc::new(RecordingRelay::new());

        let repository = SignalRepository::new(cache.clone(), store.clone());
        let engine = SignalingEngine::new(
            repository,
            RoomOrchestrator::new(provider.clone()),
            users.clone(),
            TEST_DEFAULT_TIMEOUT_SECONDS,
        );

        Self {
            cache,
            store,
            provider,
            users,
            relay,
            engine,
        }
    }

    /// Application state over the same fakes. No database, no metrics.
    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            engine: self.engine.clone(),
            relay: self.relay.clone(),
            webhooks: WebhookReceiver::new(
                TEST_WEBHOOK_API_KEY.to_string(),
                SecretString::from(TEST_WEBHOOK_API_SECRET),
            ),
            pool: None,
            request_timeout: Duration::from_secs(5),
        })
    }

    pub fn router(&self) -> Router {
        routes::build_routes(self.state(), None)
    }

    /// Serve the router on a random local port.
    ///
    /// # Example
    /// ```rust,ignore
    /// let harness = SignalHarness::new();
    /// let server = harness.spawn().await?;
    /// let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
    /// assert_eq!(response.status(), 200);
    /// ```
    pub async fn spawn(&self) -> Result<TestSignalServer, anyhow::Error> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestSignalServer {
            addr,
            _handle: handle,
        })
    }
}

/// A running test server. Aborted on drop.
pub struct TestSignalServer {
    addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl TestSignalServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestSignalServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

/// `Authorization` value for a webhook body, signed the way the provider signs it.
pub fn sign_webhook(body: &[u8]) -> String {
    sign_webhook_with(TEST_WEBHOOK_API_KEY, TEST_WEBHOOK_API_SECRET, body)
}

pub fn sign_webhook_with(api_key: &str, api_secret: &str, body: &[u8]) -> String {
    let claims = serde_json::json!({
        "iss": api_key,
        "nbf": chrono::Utc::now().timestamp(),
        "exp": chrono::Utc::now().timestamp() + 300,
        "sha256": STANDARD.encode(digest(&SHA256, body).as_ref()),
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(api_secret.as_bytes()),
    )
    .expect("webhook token should encode");
    format!("Bearer {token}")
}
