use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A persisted session record.
///
/// ⚠️ IMPORTANT: `email` and `session_token` hold CIPHERTEXT produced by
/// `FieldCipher::encrypt`. The `*_hash` fields are one-way search hashes.
/// Decrypt only at the point of use.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// The owning user account (external reference).
    pub user_id: String,
    /// Encrypted email address.
    pub email: String,
    /// Search hash of the email address.
    pub email_hash: String,
    /// Encrypted session token.
    pub session_token: String,
    /// Search hash of the session token. Unique.
    pub session_token_hash: String,
    /// Logical sign-in flag.
    pub is_signed_in: bool,
    /// Administrative kill switch. Never flipped back to `true`.
    pub is_active: bool,
    pub sign_in_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Audit only.
    pub device_info: Option<String>,
    /// Audit only.
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the session can authenticate a request at `now`.
    ///
    /// All three conditions are independently required.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_signed_in && self.is_active && self.expires_at > now
    }
}

impl TryFrom<&Row> for SessionRecord {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            email_hash: row.try_get("email_hash")?,
            session_token: row.try_get("session_token")?,
            session_token_hash: row.try_get("session_token_hash")?,
            is_signed_in: row.try_get("is_signed_in")?,
            is_active: row.try_get("is_active")?,
            sign_in_time: row.try_get("sign_in_time")?,
            last_activity: row.try_get("last_activity")?,
            expires_at: row.try_get("expires_at")?,
            device_info: row.try_get("device_info")?,
            ip_address: row.try_get("ip_address")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// The values a store needs to insert a new session.
#[derive(Debug, Clone)]
pub struct NewSessionRecord {
    pub user_id: String,
    pub email: String,
    pub email_hash: String,
    pub session_token: String,
    pub session_token_hash: String,
    pub now: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

impl NewSessionRecord {
    /// Builds the record a store will persist, signed in and active.
    pub fn into_record(self, id: Uuid) -> SessionRecord {
        SessionRecord {
            id,
            user_id: self.user_id,
            email: self.email,
            email_hash: self.email_hash,
            session_token: self.session_token,
            session_token_hash: self.session_token_hash,
            is_signed_in: true,
            is_active: true,
            sign_in_time: self.now,
            last_activity: self.now,
            expires_at: self.expires_at,
            device_info: self.device_info,
            ip_address: self.ip_address,
            created_at: self.now,
            updated_at: self.now,
        }
    }
}

/// Plaintext identifier accepted by `find_active_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentifier {
    UserId(String),
    Email(String),
    SessionToken(String),
}

/// Store-level lookup key. Emails and tokens are only ever looked up by hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKey {
    UserId(String),
    EmailHash(String),
    TokenHash(String),
}

/// Aggregate counts over the session store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
    pub distinct_active_users: u64,
    pub expiring_within_24h: u64,
}

/// A session as exposed over HTTP. Carries no token material.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub user_id: String,
    pub sign_in_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id.clone(),
            sign_in_time: record.sign_in_time,
            last_activity: record.last_activity,
            expires_at: record.expires_at,
            device_info: record.device_info.clone(),
            ip_address: record.ip_address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> SessionRecord {
        let now = Utc::now();
        NewSessionRecord {
            user_id: "u1".to_string(),
            email: "enc".to_string(),
            email_hash: "eh".to_string(),
            session_token: "enc-tok".to_string(),
            session_token_hash: "th".to_string(),
            now,
            expires_at: now + Duration::hours(1),
            device_info: None,
            ip_address: None,
        }
        .into_record(Uuid::new_v4())
    }

    #[test]
    fn usable_requires_all_three_conditions() {
        let now = Utc::now();
        let base = record();
        assert!(base.is_usable_at(now));

        let mut signed_out = base.clone();
        signed_out.is_signed_in = false;
        assert!(!signed_out.is_usable_at(now));

        let mut killed = base.clone();
        killed.is_active = false;
        assert!(!killed.is_usable_at(now));

        assert!(!base.is_usable_at(base.expires_at));
    }

    #[test]
    fn summary_drops_token_material() {
        let r = record();
        let summary = SessionSummary::from(&r);
        let json = sonic_rs::to_string(&summary).unwrap();
        assert!(!json.contains("enc-tok"));
        assert!(!json.contains("\"th\""));
        assert!(json.contains("\"user_id\":\"u1\""));
    }
}
