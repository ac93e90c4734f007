//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use argon2::Params;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    crypto::{deterministic::FieldCipher, jwt::TokenService, password::hash_password_with},
    error::Result,
    models::{
        session::{NewSessionRecord, SessionKey, SessionRecord, SessionStats},
        user::{Role, UserAccount},
    },
    repositories::session::SessionStore,
    services::session::SessionService,
};

pub fn test_cipher() -> FieldCipher {
    FieldCipher::new(&[7u8; 32])
}

pub fn test_tokens() -> TokenService {
    TokenService::new(b"unit-test-jwt-secret-unit-test-jwt", "campus-sessions".to_string())
}

/// A user whose password is hashed with cheap Argon2 parameters.
pub fn account(cipher: &FieldCipher, id: &str, email: &str, password: &str, role: Role) -> UserAccount {
    let params = Params::new(1024, 1, 1, None).unwrap();
    UserAccount {
        id: id.to_string(),
        email_hash: cipher.hash_for_search(email),
        name: format!("User {id}"),
        password_hash: hash_password_with(password, params).unwrap(),
        role,
        is_active: true,
    }
}

/// A store that never answers in time.
pub struct StalledStore;

impl StalledStore {
    async fn stall<T>() -> Result<T> {
        tokio::time::sleep(StdDuration::from_secs(3600)).await;
        unreachable!("stalled store answered")
    }
}

#[async_trait]
impl SessionStore for StalledStore {
    async fn insert(&self, _: NewSessionRecord) -> Result<SessionRecord> {
        Self::stall().await
    }
    async fn find_active(&self, _: &SessionKey, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        Self::stall().await
    }
    async fn find_by_token_hash(&self, _: &str) -> Result<Option<SessionRecord>> {
        Self::stall().await
    }
    async fn touch(&self, _: &str, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        Self::stall().await
    }
    async fn deactivate(&self, _: &str, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        Self::stall().await
    }
    async fn deactivate_user(&self, _: &str, _: DateTime<Utc>) -> Result<u64> {
        Self::stall().await
    }
    async fn delete_stale(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<u64> {
        Self::stall().await
    }
    async fn list_active_for_user(&self, _: &str, _: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        Self::stall().await
    }
    async fn extend(&self, _: &str, _: Duration, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        Self::stall().await
    }
    async fn stats(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<SessionStats> {
        Self::stall().await
    }
    async fn find_inactive(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        Self::stall().await
    }
}

/// A session service over [`StalledStore`].
pub fn slow_service(timeout: StdDuration) -> SessionService {
    SessionService::new(Arc::new(StalledStore), Arc::new(test_cipher()), timeout)
}
