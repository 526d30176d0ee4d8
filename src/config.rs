use std::env;

use thiserror::Error;

const DEV_SESSION_SECRET: &str = "forum-portal-local-session-secret";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// AppConfig
///
/// Holds the application's configuration. Immutable once loaded and pulled into
/// handlers and extractors through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and which settings are mandatory.
    pub env: Env,
    // Postgres connection string. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    // Secret used to sign and verify session tokens.
    pub session_secret: String,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Lifetime of a session token, in seconds. At most one year.
    pub session_ttl_secs: i64,
}

/// Env
///
/// Runtime context: `Local` for development conveniences, `Production` for
/// fail-fast configuration and JSON logs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// Configuration problems detected at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test state scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            session_secret: DEV_SESSION_SECRET.to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. Production refuses to start
    /// without a database and a session secret; local mode falls back to the in-memory
    /// store and a development secret.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let session_secret = env::var("SESSION_SECRET").ok().filter(|s| !s.is_empty());

        let (db_url, session_secret) = match env {
            Env::Production => (
                Some(db_url.ok_or(ConfigError::Missing("DATABASE_URL"))?),
                session_secret.ok_or(ConfigError::Missing("SESSION_SECRET"))?,
            ),
            Env::Local => (
                db_url,
                session_secret.unwrap_or_else(|| DEV_SESSION_SECRET.to_string()),
            ),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let session_ttl_secs = match env::var("SESSION_TTL_SECS") {
            Ok(raw) => match raw.parse::<i64>() {
                Ok(secs) if secs > 0 && secs <= MAX_SESSION_TTL_SECS => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SESSION_TTL_SECS",
                        value: raw,
                    });
                }
            },
            Err(_) => DEFAULT_SESSION_TTL_SECS,
        };

        Ok(Self {
            env,
            db_url,
            session_secret,
            bind_addr,
            session_ttl_secs,
        })
    }
}
