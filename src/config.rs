use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::deterministic::KEY_SIZE;
use crate::services::session::MAX_SESSION_HOURS;

/// Where session records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("Unknown STORE_BACKEND '{}' (expected postgres or memory)", other),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database. Required for the postgres backend.
    pub database_url: Option<String>,
    /// The session store backend.
    pub store_backend: StoreBackend,
    /// The URL of the Redis server. Login throttling is off without it.
    pub redis_url: Option<String>,
    /// Key material for the field cipher.
    pub encryption_key: Zeroizing<[u8; KEY_SIZE]>,
    /// HMAC secret for bearer tokens.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// The `iss` claim of issued tokens.
    pub jwt_issuer: String,
    /// Lifetime of "remember me" sessions.
    pub session_ttl_hours: i64,
    /// Lifetime of ordinary sessions.
    pub short_session_ttl_hours: i64,
    /// Interval of the expiry sweep.
    pub cleanup_interval_secs: u64,
    /// Deadline for each session store call.
    pub store_timeout_ms: u64,
    /// The address to listen on.
    pub bind_addr: SocketAddr,
    /// Whether cookies are marked `Secure`.
    pub production: bool,
}

fn parse_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

/// Reads a session lifetime, which must fall in `1..=MAX_SESSION_HOURS`.
fn lifetime_hours(name: &str, default: &str) -> Result<i64> {
    let hours: i64 = parse_or(name, default)?;
    check_lifetime(name, hours)
}

fn check_lifetime(name: &str, hours: i64) -> Result<i64> {
    if !(1..=MAX_SESSION_HOURS).contains(&hours) {
        anyhow::bail!("{} must be between 1 and {} hours, got {}", name, MAX_SESSION_HOURS, hours);
    }
    Ok(hours)
}

/// Decodes a 64-character hex key.
pub fn decode_key(hex_key: &str) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut bytes = hex::decode(hex_key.trim())
        .context("SESSION_ENCRYPTION_KEY must be valid hexadecimal")?;

    if bytes.len() != KEY_SIZE {
        bytes.zeroize();
        anyhow::bail!("SESSION_ENCRYPTION_KEY must be exactly 32 bytes (64 hex characters)");
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut key_hex = env::var("SESSION_ENCRYPTION_KEY")
            .context("SESSION_ENCRYPTION_KEY must be set (generate with: openssl rand -hex 32)")?;
        let encryption_key = decode_key(&key_hex);
        key_hex.zeroize();
        let encryption_key = encryption_key?;

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let session_ttl_hours = lifetime_hours("SESSION_TTL_HOURS", "168")?;
        let short_session_ttl_hours = lifetime_hours("SHORT_SESSION_TTL_HOURS", "24")?;

        Ok(Self {
            database_url,
            store_backend,
            redis_url: env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            encryption_key,
            jwt_secret: Zeroizing::new(jwt_secret.into_bytes()),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "campus-sessions".to_string()),
            session_ttl_hours,
            short_session_ttl_hours,
            cleanup_interval_secs: parse_or("SESSION_CLEANUP_INTERVAL_SECS", "3600")?,
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", "5000")?,
            bind_addr: parse_or("BIND_ADDR", "127.0.0.1:3000")?,
            production: env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
        })
    }
}
