use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{models::user::Role, state::AppState};

/// The cookie carrying the plaintext session token.
pub const SESSION_COOKIE: &str = "sessionId";

/// Authenticates the request and, on success, inserts the
/// `AuthenticatedUser` into the request extensions.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
/// * `roles` - The roles allowed on the route.
///
/// # Returns
///
/// The downstream `Response`, or the error response of the failed check.
async fn authorize(
    state: &AppState,
    cookies: &Cookies,
    mut request: Request<Body>,
    next: Next,
    roles: &[Role],
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let cookie = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    match state
        .auth
        .authenticate(cookie.as_deref(), authorization.as_deref(), roles)
        .await
    {
        Ok(user) => {
            tracing::debug!(user_id = %user.id, "✅ User authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Requires a signed-in user of any role.
pub async fn require_user(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    authorize(&state, &cookies, request, next, Role::ANY).await
}

/// Requires a moderator or administrator.
pub async fn require_staff(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    authorize(&state, &cookies, request, next, Role::STAFF).await
}

/// Requires an administrator.
pub async fn require_admin(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    authorize(&state, &cookies, request, next, Role::ADMIN).await
}
