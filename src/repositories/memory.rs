//! In-memory stores.
//!
//! Suitable for development and tests. Contents are lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{NewSessionRecord, SessionKey, SessionRecord, SessionStats},
    models::user::UserAccount,
    repositories::{session::SessionStore, user::UserDirectory},
};

/// In-memory session store keyed by record id.
///
/// Enforces the same unique constraint on `session_token_hash` as the
/// PostgreSQL schema.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
}

impl InMemorySessionStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records, usable or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns true if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Applies `f` to the raw record with `token_hash`, bypassing every
    /// lifecycle rule. Returns false if no such record exists.
    pub async fn modify<F>(&self, token_hash: &str, f: F) -> bool
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut sessions = self.sessions.write().await;
        match sessions.values_mut().find(|s| s.session_token_hash == token_hash) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }
}

fn matches_key(record: &SessionRecord, key: &SessionKey) -> bool {
    match key {
        SessionKey::UserId(v) => &record.user_id == v,
        SessionKey::EmailHash(v) => &record.email_hash == v,
        SessionKey::TokenHash(v) => &record.session_token_hash == v,
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, new: NewSessionRecord) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().await;

        if sessions
            .values()
            .any(|s| s.session_token_hash == new.session_token_hash)
        {
            return Err(AppError::DuplicateToken);
        }

        let record = new.into_record(Uuid::new_v4());
        sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_active(&self, key: &SessionKey, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| matches_key(s, key) && s.is_usable_at(now))
            .max_by_key(|s| s.last_activity)
            .cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| s.session_token_hash == token_hash)
            .cloned())
    }

    async fn touch(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .find(|s| s.session_token_hash == token_hash && s.is_signed_in && s.is_active)
            .map(|s| {
                s.last_activity = now;
                s.clone()
            }))
    }

    async fn deactivate(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .find(|s| s.session_token_hash == token_hash)
            .map(|s| {
                s.is_signed_in = false;
                s.is_active = false;
                s.updated_at = now;
                s.clone()
            }))
    }

    async fn deactivate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let mut modified = 0u64;
        for s in sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && (s.is_signed_in || s.is_active))
        {
            s.is_signed_in = false;
            s.is_active = false;
            s.updated_at = now;
            modified += 1;
        }
        Ok(modified)
    }

    async fn delete_stale(&self, now: DateTime<Utc>, grace_cutoff: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| {
            let expired = s.expires_at <= now;
            let retired = !s.is_signed_in && !s.is_active && s.updated_at < grace_cutoff;
            !(expired || retired)
        });
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }

    async fn list_active_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_usable_at(now))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(found)
    }

    async fn extend(&self, token_hash: &str, additional: Duration, now: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        let mut sessions = self.sessions.write().await;
        let Some(s) = sessions
            .values_mut()
            .find(|s| s.session_token_hash == token_hash && s.is_usable_at(now))
        else {
            return Ok(None);
        };

        s.expires_at = s
            .expires_at
            .checked_add_signed(additional)
            .ok_or_else(|| AppError::Validation("Extension is out of range".to_string()))?;
        s.updated_at = now;
        Ok(Some(s.clone()))
    }

    async fn stats(&self, now: DateTime<Utc>, horizon: DateTime<Utc>) -> Result<SessionStats> {
        let sessions = self.sessions.read().await;
        let mut stats = SessionStats {
            total: sessions.len() as u64,
            ..SessionStats::default()
        };
        let mut users = std::collections::HashSet::new();

        for s in sessions.values() {
            if s.expires_at <= now {
                stats.expired += 1;
            }
            if s.is_usable_at(now) {
                stats.active += 1;
                users.insert(s.user_id.as_str());
                if s.expires_at <= horizon {
                    stats.expiring_within_24h += 1;
                }
            }
        }

        stats.distinct_active_users = users.len() as u64;
        Ok(stats)
    }

    async fn find_inactive(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read().await;
        let mut found: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| s.is_usable_at(now) && s.last_activity < cutoff)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.last_activity);
        Ok(found)
    }
}

/// In-memory user directory.
#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserAccount>>>,
}

impl InMemoryUserDirectory {
    /// Creates a new, empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub async fn insert(&self, user: UserAccount) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn find_by_email_hash(&self, email_hash: &str) -> Result<Option<UserAccount>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email_hash == email_hash)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(user_id: &str, token_hash: &str, ttl: Duration) -> NewSessionRecord {
        let now = Utc::now();
        NewSessionRecord {
            user_id: user_id.to_string(),
            email: "enc".to_string(),
            email_hash: format!("email-{user_id}"),
            session_token: format!("enc-{token_hash}"),
            session_token_hash: token_hash.to_string(),
            now,
            expires_at: now + ttl,
            device_info: None,
            ip_address: None,
        }
    }

    #[tokio::test]
    async fn duplicate_token_hash_is_rejected() {
        let store = InMemorySessionStore::new();
        store.insert(new_session("u1", "h1", Duration::hours(1))).await.unwrap();
        let second = store.insert(new_session("u2", "h1", Duration::hours(1))).await;
        assert!(matches!(second, Err(AppError::DuplicateToken)));
        assert_eq!(store.len().await, 1);

        let kept = store.find_by_token_hash("h1").await.unwrap().unwrap();
        assert_eq!(kept.user_id, "u1");
    }

    #[tokio::test]
    async fn deactivate_user_counts_only_live_rows() {
        let store = InMemorySessionStore::new();
        store.insert(new_session("u1", "a", Duration::hours(1))).await.unwrap();
        store.insert(new_session("u1", "b", Duration::hours(1))).await.unwrap();
        store.insert(new_session("u2", "c", Duration::hours(1))).await.unwrap();

        let now = Utc::now();
        assert_eq!(store.deactivate_user("u1", now).await.unwrap(), 2);
        assert_eq!(store.deactivate_user("u1", now).await.unwrap(), 0);
        assert!(store.find_active(&SessionKey::TokenHash("c".into()), now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn touch_skips_deactivated_sessions() {
        let store = InMemorySessionStore::new();
        store.insert(new_session("u1", "a", Duration::hours(1))).await.unwrap();
        store.deactivate("a", Utc::now()).await.unwrap();
        assert!(store.touch("a", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_buckets() {
        let store = InMemorySessionStore::new();
        store.insert(new_session("u1", "a", Duration::hours(2))).await.unwrap();
        store.insert(new_session("u1", "b", Duration::hours(72))).await.unwrap();
        store.insert(new_session("u2", "c", Duration::hours(72))).await.unwrap();
        store.insert(new_session("u3", "d", Duration::hours(1))).await.unwrap();
        store.modify("d", |s| s.expires_at = Utc::now() - Duration::minutes(1)).await;

        let now = Utc::now();
        let stats = store.stats(now, now + Duration::hours(24)).await.unwrap();
        assert_eq!(
            stats,
            SessionStats {
                total: 4,
                active: 3,
                expired: 1,
                distinct_active_users: 2,
                expiring_within_24h: 1,
            }
        );
    }

    #[tokio::test]
    async fn expiry_boundary_agrees_between_stats_and_sweep() {
        let store = InMemorySessionStore::new();
        store.insert(new_session("u1", "edge", Duration::hours(1))).await.unwrap();
        store.insert(new_session("u2", "live", Duration::hours(1))).await.unwrap();

        let now = Utc::now();
        store.modify("edge", |s| s.expires_at = now).await;

        let stats = store.stats(now, now + Duration::hours(24)).await.unwrap();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.active, 1);

        assert_eq!(store.delete_stale(now, now - Duration::hours(24)).await.unwrap(), 1);
        assert!(store.find_by_token_hash("edge").await.unwrap().is_none());
        assert!(store.find_by_token_hash("live").await.unwrap().is_some());
    }
}
