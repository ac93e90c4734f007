use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::USER_AGENT, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::Result,
    middleware_layer::auth::SESSION_COOKIE,
    models::session::SessionSummary,
    models::user::AuthenticatedUser,
    state::AppState,
    validation::auth::{validate, LoginRequest},
};

/// Longest user agent kept as device info.
const MAX_DEVICE_INFO: usize = 256;

/// Audit data about the calling client.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let device_info = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_DEVICE_INFO).collect());
        let ip_address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());

        Ok(Self {
            device_info,
            ip_address,
        })
    }
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for a successful sign-in.
#[derive(Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: AuthenticatedUser,
    /// Bearer token for clients that cannot hold cookies.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Creates the session cookie.
fn create_session_cookie(value: String, max_age: Duration, production: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    if production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(max_age);
    cookie.set_path("/");
    cookie
}

fn clear_session_cookie(cookies: &Cookies) {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookies.remove(cookie);
}

/// Handles sign-in.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!(remember_me = payload.remember_me, "🔐 Login attempt");
    validate(&payload)?;

    let signed = state
        .auth
        .sign_in(
            &payload.email,
            &payload.password,
            payload.remember_me,
            client.device_info,
            client.ip_address,
        )
        .await?;

    let max_age = Duration::seconds((signed.session.expires_at - Utc::now()).num_seconds().max(0));
    cookies.add(create_session_cookie(
        signed.user.session_token.clone(),
        max_age,
        state.config.production,
    ));
    tracing::info!(user_id = %signed.user.id, "✅ Session cookie added");

    let response = LoginResponse {
        success: true,
        expires_at: signed.session.expires_at,
        token: signed.access_token,
        user: signed.user,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Signs out the calling session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!(user_id = %user.id, "👋 Logout");
    state.auth.sign_out(&user).await?;
    clear_session_cookie(&cookies);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Signs out every session of the caller.
#[axum::debug_handler]
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    cookies: Cookies,
) -> Result<Response> {
    let count = state.auth.sign_out_everywhere(&user).await?;
    clear_session_cookie(&cookies);

    let response = AuthResponse {
        success: true,
        message: format!("Signed out of {} session(s)", count),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the caller's identity.
pub async fn me(Extension(user): Extension<AuthenticatedUser>) -> Json<AuthenticatedUser> {
    Json(user)
}

/// Lists the caller's active sessions.
#[axum::debug_handler]
pub async fn my_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<SessionSummary>>> {
    let sessions = state.manager.get_user_active_sessions(&user.id).await?;
    Ok(Json(sessions.iter().map(SessionSummary::from).collect()))
}

/// Liveness probe.
pub async fn health() -> Json<AuthResponse> {
    Json(AuthResponse {
        success: true,
        message: "ok".to_string(),
    })
}
