//! Signal service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:10300";

/// Default lifetime of participant access tokens (6 hours).
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 21_600;

/// Default time an RTC room stays open with nobody in it.
pub const DEFAULT_EMPTY_ROOM_TIMEOUT_SECONDS: u32 = 300;

/// Invitation timeout used when a request carries a non-positive one.
pub const DEFAULT_INVITE_TIMEOUT_SECONDS: i32 = 60;

/// Per-request deadline bounding provider and relay calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Default PostgreSQL pool size.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Signal service configuration.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL (invitation cache).
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// PostgreSQL connection URL (invitation records).
    pub database_url: SecretString,

    /// Maximum pooled database connections.
    pub database_max_connections: u32,

    /// HTTP bind address (default: "0.0.0.0:10300").
    pub bind_address: String,

    /// RTC provider API base URL (e.g., "http://livekit:7880").
    pub rtc_api_url: String,

    /// URL handed to clients for media connections. Defaults to `rtc_api_url`.
    pub rtc_live_url: String,

    /// RTC provider API key (token issuer).
    pub rtc_api_key: String,

    /// RTC provider API secret (HS256 signing key).
    pub rtc_api_secret: SecretString,

    pub rtc_token_ttl_seconds: u64,

    pub rtc_empty_room_timeout_seconds: u32,

    /// Timeout applied to invitations that arrive without one.
    pub default_invite_timeout_seconds: i32,

    pub request_timeout_seconds: u64,

    /// User directory base URL.
    pub user_directory_url: String,

    pub user_directory_token: Option<SecretString>,

    /// Messaging relay base URL.
    pub relay_url: String,

    pub relay_token: Option<SecretString>,

    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("database_url", &"[REDACTED]")
            .field("database_max_connections", &self.database_max_connections)
            .field("bind_address", &self.bind_address)
            .field("rtc_api_url", &self.rtc_api_url)
            .field("rtc_live_url", &self.rtc_live_url)
            .field("rtc_api_key", &self.rtc_api_key)
            .field("rtc_api_secret", &"[REDACTED]")
            .field("rtc_token_ttl_seconds", &self.rtc_token_ttl_seconds)
            .field(
                "rtc_empty_room_timeout_seconds",
                &self.rtc_empty_room_timeout_seconds,
            )
            .field(
                "default_invite_timeout_seconds",
                &self.default_invite_timeout_seconds,
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("user_directory_url", &self.user_directory_url)
            .field(
                "user_directory_token",
                &self.user_directory_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("relay_url", &self.relay_url)
            .field("relay_token", &self.relay_token.as_ref().map(|_| "[REDACTED]"))
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(required(vars, "REDIS_URL")?);
        let database_url = SecretString::from(required(vars, "DATABASE_URL")?);
        let rtc_api_url = required(vars, "RTC_API_URL")?
            .trim_end_matches('/')
            .to_string();
        let rtc_api_key = required(vars, "RTC_API_KEY")?;
        let rtc_api_secret = SecretString::from(required(vars, "RTC_API_SECRET")?);
        let user_directory_url = required(vars, "USER_DIRECTORY_URL")?
            .trim_end_matches('/')
            .to_string();
        let relay_url = required(vars, "RELAY_URL")?
            .trim_end_matches('/')
            .to_string();

        let bind_address = vars
            .get("SIGNAL_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let rtc_live_url = vars
            .get("RTC_LIVE_URL")
            .cloned()
            .unwrap_or_else(|| rtc_api_url.clone());

        let rtc_token_ttl_seconds =
            parse_or(vars, "RTC_TOKEN_TTL_SECONDS", DEFAULT_TOKEN_TTL_SECONDS)?;
        if rtc_token_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "RTC_TOKEN_TTL_SECONDS must be positive".to_string(),
            ));
        }

        let rtc_empty_room_timeout_seconds = parse_or(
            vars,
            "RTC_EMPTY_ROOM_TIMEOUT_SECONDS",
            DEFAULT_EMPTY_ROOM_TIMEOUT_SECONDS,
        )?;

        let default_invite_timeout_seconds = parse_or(
            vars,
            "SIGNAL_DEFAULT_TIMEOUT_SECONDS",
            DEFAULT_INVITE_TIMEOUT_SECONDS,
        )?;
        if default_invite_timeout_seconds <= 0 {
            return Err(ConfigError::InvalidValue(
                "SIGNAL_DEFAULT_TIMEOUT_SECONDS must be positive".to_string(),
            ));
        }

        let request_timeout_seconds = parse_or(
            vars,
            "SIGNAL_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?;

        let database_max_connections = parse_or(
            vars,
            "DATABASE_MAX_CONNECTIONS",
            DEFAULT_DATABASE_MAX_CONNECTIONS,
        )?;

        let user_directory_token = vars
            .get("USER_DIRECTORY_TOKEN")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let relay_token = vars
            .get("RELAY_TOKEN")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let log_json = parse_or(vars, "SIGNAL_LOG_JSON", false)?;

        Ok(Config {
            redis_url,
            database_url,
            database_max_connections,
            bind_address,
            rtc_api_url,
            rtc_live_url,
            rtc_api_key,
            rtc_api_secret,
            rtc_token_ttl_seconds,
            rtc_empty_room_timeout_seconds,
            default_invite_timeout_seconds,
            request_timeout_seconds,
            user_directory_url,
            user_directory_token,
            relay_url,
            relay_token,
            log_json,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}
