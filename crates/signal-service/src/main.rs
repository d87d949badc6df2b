//! Signal Service
//!
//! Call signaling engine over Redis, PostgreSQL and a LiveKit room provider.

use secrecy::ExposeSecret;
use signal_service::cache::RedisInvitationCache;
use signal_service::clients::{HttpMessagingRelay, HttpUserDirectory};
use signal_service::config::Config;
use signal_service::engine::SignalingEngine;
use signal_service::observability;
use signal_service::repository::SignalRepository;
use signal_service::routes::{self, AppState};
use signal_service::rtc::livekit::{LiveKitRoomProvider, LiveKitSettings};
use signal_service::rtc::webhook::WebhookReceiver;
use signal_service::rtc::RoomOrchestrator;
use signal_service::store::PgInvitationStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    observability::init_tracing(config.log_json);

    info!("Starting Signal Service");
    info!(
        bind_address = %config.bind_address,
        rtc_api_url = %config.rtc_api_url,
        default_invite_timeout_seconds = config.default_invite_timeout_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = observability::metrics::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database_url.expose_secret())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;
    info!("Database connection established");

    info!("Connecting to Redis...");
    let cache = RedisInvitationCache::connect(config.redis_url.expose_secret()).await?;
    info!("Redis connection established");

    let provider = LiveKitRoomProvider::new(LiveKitSettings {
        api_url: config.rtc_api_url.clone(),
        live_url: config.rtc_live_url.clone(),
        api_key: config.rtc_api_key.clone(),
        api_secret: config.rtc_api_secret.clone(),
        token_ttl_seconds: config.rtc_token_ttl_seconds,
        empty_room_timeout_seconds: config.rtc_empty_room_timeout_seconds,
    })?;

    let request_timeout = Duration::from_secs(config.request_timeout_seconds);
    let users = HttpUserDirectory::with_timeout(
        config.user_directory_url.clone(),
        config.user_directory_token.clone(),
        request_timeout,
    )?;
    let relay = HttpMessagingRelay::with_timeout(
        config.relay_url.clone(),
        config.relay_token.clone(),
        request_timeout,
    )?;

    let repository = SignalRepository::new(
        Arc::new(cache),
        Arc::new(PgInvitationStore::new(db_pool.clone())),
    );
    let engine = SignalingEngine::new(
        repository,
        RoomOrchestrator::new(Arc::new(provider)),
        Arc::new(users),
        config.default_invite_timeout_seconds,
    );

    let state = Arc::new(AppState {
        engine,
        relay: Arc::new(relay),
        webhooks: WebhookReceiver::new(
            config.rtc_api_key.clone(),
            config.rtc_api_secret.clone(),
        ),
        pool: Some(db_pool),
        request_timeout,
    });

    let app = routes::build_routes(state, Some(metrics_handle));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    info!("Signal Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Signal Service shutdown complete");

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    token.cancel();
}
