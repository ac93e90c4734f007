use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::{
    crypto::deterministic::FieldCipher,
    error::{AppError, Result},
    models::session::{NewSessionRecord, SessionIdentifier, SessionKey, SessionRecord, SessionStats},
    repositories::session::SessionStore,
};

/// How long an invalidated session is kept for audit before cleanup deletes it.
pub const INVALIDATED_RETENTION_HOURS: i64 = 24;

/// Longest lifetime a session may be created with, and the largest single
/// extension, in hours.
pub const MAX_SESSION_HOURS: i64 = 8760;

/// Converts a positive hour count no larger than [`MAX_SESSION_HOURS`].
pub(crate) fn bounded_hours(hours: i64, what: &str) -> Result<Duration> {
    if !(1..=MAX_SESSION_HOURS).contains(&hours) {
        return Err(AppError::Validation(format!(
            "{} must be between 1 and {} hours",
            what, MAX_SESSION_HOURS
        )));
    }
    Duration::try_hours(hours)
        .ok_or_else(|| AppError::Validation(format!("{} is out of range", what)))
}

/// Runs a store call under `timeout`, reporting a miss as `StoreTimeout(op)`.
pub(crate) async fn with_deadline<T, F>(timeout: StdDuration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(operation = op, timeout_ms = timeout.as_millis() as u64, "⏱️ Store deadline exceeded");
            Err(AppError::StoreTimeout(op))
        }
    }
}

/// Session lifecycle operations.
///
/// Plaintext emails and tokens enter here and leave only as ciphertext and
/// search hashes. Every store call runs under a deadline; a missed deadline is
/// `AppError::StoreTimeout`, never an empty result.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    cipher: Arc<FieldCipher>,
    timeout: StdDuration,
}

impl SessionService {
    /// Creates a new `SessionService`.
    ///
    /// # Arguments
    ///
    /// * `store` - The session record store.
    /// * `cipher` - The field cipher for emails and tokens.
    /// * `timeout` - The deadline applied to each store call.
    pub fn new(store: Arc<dyn SessionStore>, cipher: Arc<FieldCipher>, timeout: StdDuration) -> Self {
        Self { store, cipher, timeout }
    }

    /// The cipher sessions are encrypted with.
    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    /// The deadline applied to each store call.
    pub fn timeout(&self) -> StdDuration {
        self.timeout
    }

    async fn guarded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_deadline(self.timeout, op, fut).await
    }

    /// Creates a signed-in, active session.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The owning user.
    /// * `email` - The user's plaintext email.
    /// * `session_token` - The plaintext session token.
    /// * `ttl_hours` - Lifetime in hours, from 1 to [`MAX_SESSION_HOURS`].
    /// * `device_info` - Optional audit data.
    /// * `ip_address` - Optional audit data.
    ///
    /// # Returns
    ///
    /// The stored record, or `AppError::DuplicateToken` if the token is taken.
    pub async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        session_token: &str,
        ttl_hours: i64,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<SessionRecord> {
        let ttl = bounded_hours(ttl_hours, "Session lifetime")?;
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::Validation("Session lifetime is out of range".to_string()))?;

        let new = NewSessionRecord {
            user_id: user_id.to_string(),
            email: self.cipher.encrypt(email),
            email_hash: self.cipher.hash_for_search(email),
            session_token: self.cipher.encrypt(session_token),
            session_token_hash: self.cipher.hash_for_search(session_token),
            now,
            expires_at,
            device_info,
            ip_address,
        };

        let record = self.guarded("create_session", self.store.insert(new)).await?;
        tracing::info!(user_id = %record.user_id, expires_at = %record.expires_at, "✅ Session created");
        Ok(record)
    }

    /// Finds a usable session by plaintext identifier.
    pub async fn find_active_session(&self, identifier: &SessionIdentifier) -> Result<Option<SessionRecord>> {
        let key = match identifier {
            SessionIdentifier::UserId(id) => SessionKey::UserId(id.clone()),
            SessionIdentifier::Email(email) => SessionKey::EmailHash(self.cipher.hash_for_search(email)),
            SessionIdentifier::SessionToken(token) => {
                SessionKey::TokenHash(self.cipher.hash_for_search(token))
            }
        };

        self.guarded("find_active_session", self.store.find_active(&key, Utc::now()))
            .await
    }

    /// Bumps `last_activity`. `None` if the session is missing or no longer
    /// signed in and active.
    pub async fn update_activity(&self, session_token: &str) -> Result<Option<SessionRecord>> {
        let hash = self.cipher.hash_for_search(session_token);
        self.guarded("update_activity", self.store.touch(&hash, Utc::now()))
            .await
    }

    /// Signs out one session. Idempotent.
    pub async fn invalidate_session(&self, session_token: &str) -> Result<Option<SessionRecord>> {
        let hash = self.cipher.hash_for_search(session_token);
        let record = self
            .guarded("invalidate_session", self.store.deactivate(&hash, Utc::now()))
            .await?;

        if let Some(ref r) = record {
            tracing::info!(user_id = %r.user_id, "👋 Session invalidated");
        }
        Ok(record)
    }

    /// Signs out every session of a user. Returns how many were still live.
    pub async fn invalidate_all_user_sessions(&self, user_id: &str) -> Result<u64> {
        let modified = self
            .guarded("invalidate_all_user_sessions", self.store.deactivate_user(user_id, Utc::now()))
            .await?;
        tracing::info!(user_id, modified, "👋 All user sessions invalidated");
        Ok(modified)
    }

    /// Deletes expired sessions and sessions invalidated more than
    /// [`INVALIDATED_RETENTION_HOURS`] ago.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let now = Utc::now();
        let grace_cutoff = now - Duration::hours(INVALIDATED_RETENTION_HOURS);
        let deleted = self
            .guarded("cleanup_expired_sessions", self.store.delete_stale(now, grace_cutoff))
            .await?;
        tracing::info!(deleted, "🧹 Expired sessions cleaned up");
        Ok(deleted)
    }

    /// Privileged raw read by plaintext token, ignoring flags and expiry.
    pub async fn raw_find_by_token(&self, session_token: &str) -> Result<Option<SessionRecord>> {
        let hash = self.cipher.hash_for_search(session_token);
        self.guarded("raw_find_by_token", self.store.find_by_token_hash(&hash))
            .await
    }

    /// Decrypts the stored email of a session.
    pub fn decrypt_email(&self, record: &SessionRecord) -> Result<String> {
        Ok(self.cipher.decrypt(&record.email)?)
    }

    pub(crate) async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        self.guarded("list_active_for_user", self.store.list_active_for_user(user_id, Utc::now()))
            .await
    }

    pub(crate) async fn extend(&self, session_token: &str, additional: Duration) -> Result<Option<SessionRecord>> {
        let hash = self.cipher.hash_for_search(session_token);
        self.guarded("extend_session", self.store.extend(&hash, additional, Utc::now()))
            .await
    }

    pub(crate) async fn stats(&self, now: DateTime<Utc>, horizon: DateTime<Utc>) -> Result<SessionStats> {
        self.guarded("session_stats", self.store.stats(now, horizon))
            .await
    }

    pub(crate) async fn inactive_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        self.guarded("find_inactive", self.store.find_inactive(cutoff, Utc::now()))
            .await
    }
}
