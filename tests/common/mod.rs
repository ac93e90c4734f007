#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use argon2::Params;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, connect_info::MockConnectInfo},
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use zeroize::Zeroizing;

use campus_sessions::{
    config::{Config, StoreBackend},
    crypto::{deterministic::FieldCipher, password::hash_password_with},
    error::Result,
    models::{
        session::{NewSessionRecord, SessionKey, SessionRecord, SessionStats},
        user::{Role, UserAccount},
    },
    repositories::{
        memory::{InMemorySessionStore, InMemoryUserDirectory},
        session::SessionStore,
    },
    router::build_router,
    state::AppState,
};

pub const PASSWORD: &str = "CorrectHorseBattery1";
pub const USER_EMAIL: &str = "ada@uni.edu";
pub const MOD_EMAIL: &str = "grace@uni.edu";
pub const ADMIN_EMAIL: &str = "root@uni.edu";
pub const JWT_SECRET: &[u8] = b"integration-test-secret-integration-test";

pub fn test_config() -> Config {
    Config {
        database_url: None,
        store_backend: StoreBackend::Memory,
        redis_url: None,
        encryption_key: Zeroizing::new([42u8; 32]),
        jwt_secret: Zeroizing::new(JWT_SECRET.to_vec()),
        jwt_issuer: "campus-sessions".to_string(),
        session_ttl_hours: 168,
        short_session_ttl_hours: 24,
        cleanup_interval_secs: 3600,
        store_timeout_ms: 2000,
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        production: false,
    }
}

pub fn cipher() -> FieldCipher {
    FieldCipher::new(&test_config().encryption_key)
}

fn account(id: &str, email: &str, role: Role) -> UserAccount {
    let params = Params::new(1024, 1, 1, None).unwrap();
    UserAccount {
        id: id.to_string(),
        email_hash: cipher().hash_for_search(email),
        name: format!("Test {id}"),
        password_hash: hash_password_with(PASSWORD, params).unwrap(),
        role,
        is_active: true,
    }
}

pub async fn seeded_users() -> InMemoryUserDirectory {
    let users = InMemoryUserDirectory::new();
    users.insert(account("u-ada", USER_EMAIL, Role::User)).await;
    users.insert(account("u-grace", MOD_EMAIL, Role::Mod)).await;
    users.insert(account("u-root", ADMIN_EMAIL, Role::Admin)).await;
    users
}

/// Shared test context: the full router over in-memory backends.
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub store: InMemorySessionStore,
}

/// Credentials handed out by a successful login.
pub struct LoggedIn {
    pub cookie: String,
    pub token: String,
    pub body: Value,
}

impl TestContext {
    pub async fn new() -> Self {
        let store = InMemorySessionStore::new();
        let state = AppState::from_parts(
            test_config(),
            Arc::new(store.clone()),
            Arc::new(seeded_users().await),
            None,
        );
        Self::with_state(state, store)
    }

    pub fn with_state(state: AppState, store: InMemorySessionStore) -> Self {
        let app = build_router(state.clone())
            .unwrap()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        Self { app, state, store }
    }

    pub async fn send(&self, mut request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        // tower_governor's peer-IP key extractor reads `ConnectInfo` directly
        // from the extensions and does not fall back to `MockConnectInfo`.
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> (StatusCode, HeaderMap, Value) {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "remember_me": remember_me,
        });
        self.send(
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn login_ok(&self, email: &str) -> LoggedIn {
        let (status, headers, body) = self.login(email, PASSWORD, false).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        let cookie = session_cookie(&headers).expect("sessionId cookie");
        let token = body["token"].as_str().unwrap().to_string();
        LoggedIn { cookie, token, body }
    }

    pub async fn get_with_cookie(&self, path: &str, cookie: &str) -> (StatusCode, HeaderMap, Value) {
        self.send(
            Request::get(path)
                .header(header::COOKIE, format!("sessionId={cookie}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn get_with_bearer(&self, path: &str, token: &str) -> (StatusCode, HeaderMap, Value) {
        self.send(
            Request::get(path)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json_with_cookie(&self, path: &str, cookie: &str, payload: Value) -> (StatusCode, HeaderMap, Value) {
        self.send(
            Request::post(path)
                .header(header::COOKIE, format!("sessionId={cookie}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_with_cookie(&self, path: &str, cookie: &str) -> (StatusCode, HeaderMap, Value) {
        self.send(
            Request::post(path)
                .header(header::COOKIE, format!("sessionId={cookie}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

/// Reads the `sessionId` value out of the response's `Set-Cookie` headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("sessionId="))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
}

/// A store that never answers in time.
pub struct StalledStore;

async fn stall<T>() -> Result<T> {
    tokio::time::sleep(StdDuration::from_secs(3600)).await;
    unreachable!("stalled store answered")
}

#[async_trait]
impl SessionStore for StalledStore {
    async fn insert(&self, _: NewSessionRecord) -> Result<SessionRecord> {
        stall().await
    }
    async fn find_active(&self, _: &SessionKey, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        stall().await
    }
    async fn find_by_token_hash(&self, _: &str) -> Result<Option<SessionRecord>> {
        stall().await
    }
    async fn touch(&self, _: &str, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        stall().await
    }
    async fn deactivate(&self, _: &str, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        stall().await
    }
    async fn deactivate_user(&self, _: &str, _: DateTime<Utc>) -> Result<u64> {
        stall().await
    }
    async fn delete_stale(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<u64> {
        stall().await
    }
    async fn list_active_for_user(&self, _: &str, _: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        stall().await
    }
    async fn extend(&self, _: &str, _: Duration, _: DateTime<Utc>) -> Result<Option<SessionRecord>> {
        stall().await
    }
    async fn stats(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<SessionStats> {
        stall().await
    }
    async fn find_inactive(&self, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        stall().await
    }
}
