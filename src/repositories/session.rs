use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{NewSessionRecord, SessionKey, SessionRecord, SessionStats},
};

/// Persistence for session records.
///
/// Implementations must enforce uniqueness of `session_token_hash` and report
/// a collision as [`AppError::DuplicateToken`]. Every mutation is a single
/// atomic update of one row (or one bulk statement).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a new signed-in, active session.
    async fn insert(&self, new: NewSessionRecord) -> Result<SessionRecord>;

    /// Finds a usable session (`is_signed_in && is_active && expires_at > now`).
    async fn find_active(&self, key: &SessionKey, now: DateTime<Utc>) -> Result<Option<SessionRecord>>;

    /// Raw read by token hash, ignoring flags and expiry.
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>>;

    /// Sets `last_activity = now` on a signed-in, active session.
    async fn touch(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>>;

    /// Clears both flags on one session.
    async fn deactivate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>>;

    /// Clears both flags on every session of a user. Returns the modified count.
    async fn deactivate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<u64>;

    /// Deletes sessions with `expires_at <= now` and invalidated sessions last
    /// updated before `grace_cutoff`. Returns the deleted count.
    async fn delete_stale(&self, now: DateTime<Utc>, grace_cutoff: DateTime<Utc>) -> Result<u64>;

    /// Lists a user's usable sessions, most recent activity first.
    async fn list_active_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<SessionRecord>>;

    /// Adds `additional` to the current `expires_at` of a usable session, in place.
    async fn extend(&self, token_hash: &str, additional: Duration, now: DateTime<Utc>) -> Result<Option<SessionRecord>>;

    /// Aggregate counts. `horizon` bounds the "expiring soon" bucket.
    async fn stats(&self, now: DateTime<Utc>, horizon: DateTime<Utc>) -> Result<SessionStats>;

    /// Usable sessions whose `last_activity` is before `cutoff`.
    async fn find_inactive(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<Vec<SessionRecord>>;
}

const SESSION_COLUMNS: &str = r#"
    id, user_id, email, email_hash, session_token, session_token_hash,
    is_signed_in, is_active, sign_in_time, last_activity, expires_at,
    device_info, ip_address, created_at, updated_at
"#;

const USABLE: &str = "is_signed_in = true AND is_active = true AND expires_at > $1";

/// PostgreSQL-backed session store.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore` over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn rows_to_sessions(rows: &[tokio_postgres::Row]) -> Result<Vec<SessionRecord>> {
    rows.iter().map(SessionRecord::try_from).collect()
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, new: NewSessionRecord) -> Result<SessionRecord> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO sessions (
                id, user_id, email, email_hash, session_token, session_token_hash,
                is_signed_in, is_active, sign_in_time, last_activity, expires_at,
                device_info, ip_address, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, true, true, $7, $7, $8, $9, $10, $7, $7)
            RETURNING {SESSION_COLUMNS}
            "#
        );

        let row = client
            .query_one(
                &query,
                &[
                    &Uuid::new_v4(),
                    &new.user_id,
                    &new.email,
                    &new.email_hash,
                    &new.session_token,
                    &new.session_token_hash,
                    &new.now,
                    &new.expires_at,
                    &new.device_info,
                    &new.ip_address,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    AppError::DuplicateToken
                } else {
                    AppError::from(e)
                }
            })?;

        SessionRecord::try_from(&row)
    }

    async fn find_active(&self, key: &SessionKey, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let (column, value) = match key {
            SessionKey::UserId(v) => ("user_id", v),
            SessionKey::EmailHash(v) => ("email_hash", v),
            SessionKey::TokenHash(v) => ("session_token_hash", v),
        };

        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE {USABLE} AND {column} = $2
            ORDER BY last_activity DESC
            LIMIT 1
            "#
        );

        let row = client.query_opt(&query, &[&now, value]).await?;
        row.map(|r| SessionRecord::try_from(&r)).transpose()
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_token_hash = $1");
        let row = client.query_opt(&query, &[&token_hash]).await?;
        row.map(|r| SessionRecord::try_from(&r)).transpose()
    }

    async fn touch(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE sessions
            SET last_activity = $1
            WHERE session_token_hash = $2 AND is_signed_in = true AND is_active = true
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = client.query_opt(&query, &[&now, &token_hash]).await?;
        row.map(|r| SessionRecord::try_from(&r)).transpose()
    }

    async fn deactivate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE sessions
            SET is_signed_in = false, is_active = false, updated_at = $1
            WHERE session_token_hash = $2
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row = client.query_opt(&query, &[&now, &token_hash]).await?;
        row.map(|r| SessionRecord::try_from(&r)).transpose()
    }

    async fn deactivate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let modified = client
            .execute(
                r#"
                UPDATE sessions
                SET is_signed_in = false, is_active = false, updated_at = $1
                WHERE user_id = $2 AND (is_signed_in = true OR is_active = true)
                "#,
                &[&now, &user_id],
            )
            .await?;
        Ok(modified)
    }

    async fn delete_stale(&self, now: DateTime<Utc>, grace_cutoff: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                r#"
                DELETE FROM sessions
                WHERE expires_at <= $1
                   OR (is_signed_in = false AND is_active = false AND updated_at < $2)
                "#,
                &[&now, &grace_cutoff],
            )
            .await?;
        Ok(deleted)
    }

    async fn list_active_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE {USABLE} AND user_id = $2
            ORDER BY last_activity DESC
            "#
        );
        let rows = client.query(&query, &[&now, &user_id]).await?;
        rows_to_sessions(&rows)
    }

    async fn extend(&self, token_hash: &str, additional: Duration, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            UPDATE sessions
            SET expires_at = expires_at + ($3::bigint * INTERVAL '1 second'), updated_at = $1
            WHERE {USABLE} AND session_token_hash = $2
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let seconds = additional.num_seconds();
        let row = client.query_opt(&query, &[&now, &token_hash, &seconds]).await?;
        row.map(|r| SessionRecord::try_from(&r)).transpose()
    }

    async fn stats(&self, now: DateTime<Utc>, horizon: DateTime<Utc>) -> Result<SessionStats> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE is_signed_in AND is_active AND expires_at > $1) AS active,
                    COUNT(*) FILTER (WHERE expires_at <= $1) AS expired,
                    COUNT(DISTINCT user_id) FILTER (WHERE is_signed_in AND is_active AND expires_at > $1) AS distinct_active_users,
                    COUNT(*) FILTER (WHERE is_signed_in AND is_active AND expires_at > $1 AND expires_at <= $2) AS expiring
                FROM sessions
                "#,
                &[&now, &horizon],
            )
            .await?;

        Ok(SessionStats {
            total: count(row.try_get("total")?),
            active: count(row.try_get("active")?),
            expired: count(row.try_get("expired")?),
            distinct_active_users: count(row.try_get("distinct_active_users")?),
            expiring_within_24h: count(row.try_get("expiring")?),
        })
    }

    async fn find_inactive(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE {USABLE} AND last_activity < $2
            ORDER BY last_activity ASC
            "#
        );
        let rows = client.query(&query, &[&now, &cutoff]).await?;
        rows_to_sessions(&rows)
    }
}
