use std::sync::Arc;

use crate::{
    crypto::{
        jwt::{TokenService, TokenUser},
        password::verify_password,
        token::generate_session_token,
    },
    error::{AppError, Result, INSUFFICIENT_PRIVILEGES_MESSAGE},
    models::{
        session::{SessionIdentifier, SessionRecord},
        user::{AuthenticatedUser, Role, UserAccount},
    },
    repositories::user::UserDirectory,
    services::session::{with_deadline, SessionService},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Lifetimes for new sessions, in hours.
#[derive(Debug, Clone, Copy)]
pub struct SessionLifetimes {
    /// Used when the user asks to be remembered.
    pub long_hours: i64,
    /// Used otherwise.
    pub short_hours: i64,
}

/// The result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: AuthenticatedUser,
    pub session: SessionRecord,
    /// Bearer token bound to the new session.
    pub access_token: String,
}

/// Produces plaintext session tokens for new sessions.
pub type TokenSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Sign-in, sign-out and request authentication.
#[derive(Clone)]
pub struct AuthService {
    sessions: SessionService,
    users: Arc<dyn UserDirectory>,
    tokens: TokenService,
    lifetimes: SessionLifetimes,
    token_source: TokenSource,
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl AuthService {
    pub fn new(
        sessions: SessionService,
        users: Arc<dyn UserDirectory>,
        tokens: TokenService,
        lifetimes: SessionLifetimes,
    ) -> Self {
        Self {
            sessions,
            users,
            tokens,
            lifetimes,
            token_source: Arc::new(generate_session_token),
        }
    }

    /// Replaces the generator of session tokens.
    pub fn with_token_source(mut self, token_source: TokenSource) -> Self {
        self.token_source = token_source;
        self
    }

    async fn user_by_id(&self, user_id: &str) -> Result<Option<UserAccount>> {
        with_deadline(self.sessions.timeout(), "find_user", self.users.find_by_id(user_id)).await
    }

    /// Signs a user in with email and password.
    ///
    /// # Arguments
    ///
    /// * `email` - The user's email address.
    /// * `password` - The user's password.
    /// * `remember_me` - Selects the long session lifetime.
    /// * `device_info` - Optional audit data.
    /// * `ip_address` - Optional audit data.
    ///
    /// # Returns
    ///
    /// The identity, the new session and a bearer token bound to it.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<SignIn> {
        let email_hash = self.sessions.cipher().hash_for_search(email);
        let user = with_deadline(
            self.sessions.timeout(),
            "find_user",
            self.users.find_by_email_hash(&email_hash),
        )
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        let ttl_hours = if remember_me {
            self.lifetimes.long_hours
        } else {
            self.lifetimes.short_hours
        };

        let mut session_token = (self.token_source)();
        let session = match self
            .sessions
            .create_session(&user.id, email, &session_token, ttl_hours, device_info.clone(), ip_address.clone())
            .await
        {
            Err(AppError::DuplicateToken) => {
                tracing::warn!(user_id = %user.id, "🔁 Session token collision, regenerating");
                session_token = (self.token_source)();
                self.sessions
                    .create_session(&user.id, email, &session_token, ttl_hours, device_info, ip_address)
                    .await?
            }
            other => other?,
        };

        let access_token = self.tokens.issue(
            TokenUser {
                id: user.id.clone(),
                name: user.name.clone(),
                role: user.role,
            },
            &session_token,
            session.expires_at,
        )?;

        tracing::info!(user_id = %user.id, remember_me, "✅ User signed in");

        Ok(SignIn {
            user: AuthenticatedUser {
                id: user.id,
                email: email.to_string(),
                role: user.role,
                name: user.name,
                session_token,
            },
            session,
            access_token,
        })
    }

    /// Resolves the caller of a request.
    ///
    /// The `sessionId` cookie is tried first. If it is absent or does not
    /// name a usable session, a bearer token is verified and the session it
    /// is bound to must still be usable. The role check runs last.
    ///
    /// # Arguments
    ///
    /// * `cookie_session_id` - Value of the `sessionId` cookie, if any.
    /// * `authorization` - Value of the `Authorization` header, if any.
    /// * `required_roles` - Roles allowed on the route.
    pub async fn authenticate(
        &self,
        cookie_session_id: Option<&str>,
        authorization: Option<&str>,
        required_roles: &[Role],
    ) -> Result<AuthenticatedUser> {
        let mut resolved: Option<(SessionRecord, String)> = None;

        if let Some(token) = cookie_session_id.filter(|t| !t.is_empty()) {
            let identifier = SessionIdentifier::SessionToken(token.to_string());
            if let Some(record) = self.sessions.find_active_session(&identifier).await? {
                resolved = Some((record, token.to_string()));
            } else {
                tracing::debug!("Cookie session not usable, trying bearer token");
            }
        }

        if resolved.is_none() {
            if let Some(bearer) = authorization.and_then(extract_bearer_token) {
                let claims = self.tokens.verify(bearer)?;
                let identifier = SessionIdentifier::SessionToken(claims.session_token.clone());
                if let Some(record) = self.sessions.find_active_session(&identifier).await? {
                    resolved = Some((record, claims.session_token));
                } else {
                    tracing::debug!(user_id = %claims.sub, "Bearer token outlived its session");
                }
            }
        }

        let (record, session_token) = resolved.ok_or(AppError::Unauthenticated)?;

        let user = self
            .user_by_id(&record.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                tracing::warn!(user_id = %record.user_id, "❌ Session belongs to a missing or disabled user");
                AppError::Unauthenticated
            })?;

        if !required_roles.contains(&user.role) {
            tracing::warn!(user_id = %user.id, role = ?user.role, "❌ {}", INSUFFICIENT_PRIVILEGES_MESSAGE);
            return Err(AppError::InsufficientPrivileges);
        }

        let email = self.sessions.decrypt_email(&record)?;

        if self.sessions.update_activity(&session_token).await?.is_none() {
            tracing::debug!(user_id = %user.id, "Session invalidated mid-request");
            return Err(AppError::Unauthenticated);
        }

        Ok(AuthenticatedUser {
            id: user.id,
            email,
            role: user.role,
            name: user.name,
            session_token,
        })
    }

    /// Signs out the session that authenticated `user`.
    pub async fn sign_out(&self, user: &AuthenticatedUser) -> Result<Option<SessionRecord>> {
        self.sessions.invalidate_session(&user.session_token).await
    }

    /// Signs out every session of `user`.
    pub async fn sign_out_everywhere(&self, user: &AuthenticatedUser) -> Result<u64> {
        self.sessions.invalidate_all_user_sessions(&user.id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::repositories::memory::{InMemorySessionStore, InMemoryUserDirectory};
    use crate::test_support::{account, test_cipher, test_tokens};

    struct Fixture {
        store: InMemorySessionStore,
        sessions: SessionService,
        auth: AuthService,
    }

    async fn fixture() -> Fixture {
        let store = InMemorySessionStore::new();
        let cipher = Arc::new(test_cipher());
        let users = InMemoryUserDirectory::new();
        users.insert(account(&cipher, "u1", "ada@uni.edu", "correct horse", Role::User)).await;
        users.insert(account(&cipher, "a1", "root@uni.edu", "correct horse", Role::Admin)).await;

        let sessions = SessionService::new(Arc::new(store.clone()), cipher, StdDuration::from_secs(5));
        let auth = AuthService::new(
            sessions.clone(),
            Arc::new(users),
            test_tokens(),
            SessionLifetimes {
                long_hours: 168,
                short_hours: 24,
            },
        );
        Fixture { store, sessions, auth }
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("abc"), None);
    }

    #[tokio::test]
    async fn sign_in_rejects_bad_credentials_uniformly() {
        let f = fixture().await;
        let wrong_password = f.auth.sign_in("ada@uni.edu", "nope", false, None, None).await;
        let unknown = f.auth.sign_in("who@uni.edu", "nope", false, None, None).await;

        match (wrong_password, unknown) {
            (Err(AppError::Authentication(a)), Err(AppError::Authentication(b))) => assert_eq!(a, b),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn remember_me_selects_long_lifetime() {
        let f = fixture().await;
        let short = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        let long = f.auth.sign_in("ada@uni.edu", "correct horse", true, None, None).await.unwrap();

        assert_eq!(short.session.expires_at - short.session.sign_in_time, Duration::hours(24));
        assert_eq!(long.session.expires_at - long.session.sign_in_time, Duration::hours(168));
    }

    /// Hands out `tokens` in order, then fresh ones.
    fn scripted(tokens: &[&str]) -> TokenSource {
        let queue = Mutex::new(tokens.iter().map(|t| t.to_string()).collect::<VecDeque<_>>());
        Arc::new(move || queue.lock().unwrap().pop_front().unwrap_or_else(generate_session_token))
    }

    #[tokio::test]
    async fn token_collision_is_retried_once() {
        let f = fixture().await;
        f.sessions.create_session("u9", "x@uni.edu", "taken", 24, None, None).await.unwrap();
        let auth = f.auth.clone().with_token_source(scripted(&["taken", "fresh"]));

        let signed = auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();

        assert_eq!(signed.user.session_token, "fresh");
        assert_eq!(signed.session.user_id, "u1");
        assert_eq!(f.store.len().await, 2);
        let kept = f.sessions.raw_find_by_token("taken").await.unwrap().unwrap();
        assert_eq!(kept.user_id, "u9");
    }

    #[tokio::test]
    async fn second_collision_surfaces_duplicate_token() {
        let f = fixture().await;
        f.sessions.create_session("u9", "x@uni.edu", "taken", 24, None, None).await.unwrap();
        let auth = f.auth.clone().with_token_source(scripted(&["taken", "taken"]));

        let result = auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await;

        assert!(matches!(result, Err(AppError::DuplicateToken)));
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn cookie_channel_authenticates() {
        let f = fixture().await;
        let signed = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();

        let user = f
            .auth
            .authenticate(Some(&signed.user.session_token), None, Role::ANY)
            .await
            .unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "ada@uni.edu");
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn bearer_channel_authenticates_after_cookie_miss() {
        let f = fixture().await;
        let signed = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        let header = format!("Bearer {}", signed.access_token);

        let user = f
            .auth
            .authenticate(Some("stale-cookie"), Some(&header), Role::ANY)
            .await
            .unwrap();
        assert_eq!(user.session_token, signed.user.session_token);
    }

    #[tokio::test]
    async fn revoked_session_rejects_valid_jwt() {
        let f = fixture().await;
        let signed = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        f.auth.sign_out(&signed.user).await.unwrap();

        let header = format!("Bearer {}", signed.access_token);
        let result = f.auth.authenticate(None, Some(&header), Role::ANY).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn tampered_jwt_is_invalid() {
        let f = fixture().await;
        let signed = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        let header = format!("Bearer {}x", signed.access_token);

        let result = f.auth.authenticate(None, Some(&header), Role::ANY).await;
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn role_check_runs_after_session_resolution() {
        let f = fixture().await;
        let user = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        let admin = f.auth.sign_in("root@uni.edu", "correct horse", false, None, None).await.unwrap();

        let denied = f
            .auth
            .authenticate(Some(&user.user.session_token), None, Role::ADMIN)
            .await;
        assert!(matches!(denied, Err(AppError::InsufficientPrivileges)));

        let allowed = f
            .auth
            .authenticate(Some(&admin.user.session_token), None, Role::STAFF)
            .await
            .unwrap();
        assert_eq!(allowed.role, Role::Admin);
    }

    #[tokio::test]
    async fn authenticate_bumps_activity() {
        let f = fixture().await;
        let signed = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        let hash = f.sessions.cipher().hash_for_search(&signed.user.session_token);
        let earlier = Utc::now() - Duration::minutes(30);
        f.store.modify(&hash, |s| s.last_activity = earlier).await;

        f.auth
            .authenticate(Some(&signed.user.session_token), None, Role::ANY)
            .await
            .unwrap();

        let raw = f.sessions.raw_find_by_token(&signed.user.session_token).await.unwrap().unwrap();
        assert!(raw.last_activity > earlier);
    }

    #[tokio::test]
    async fn sign_out_everywhere_kills_every_session() {
        let f = fixture().await;
        let first = f.auth.sign_in("ada@uni.edu", "correct horse", false, None, None).await.unwrap();
        let second = f.auth.sign_in("ada@uni.edu", "correct horse", true, None, None).await.unwrap();

        assert_eq!(f.auth.sign_out_everywhere(&first.user).await.unwrap(), 2);
        let result = f
            .auth
            .authenticate(Some(&second.user.session_token), None, Role::ANY)
            .await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }
}
