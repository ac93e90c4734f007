use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use http::{header, HeaderValue, Method};
use tower_cookies::CookieManagerLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers::{admin, auth},
    middleware_layer::{
        auth::{require_admin, require_staff, require_user},
        rate_limit::rate_limit_login,
    },
    state::AppState,
};

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://[::1]:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}

/// Builds the application router.
///
/// Protected routes are rate limited per peer IP, so the service must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// A `Result` containing the `Router`.
pub fn build_router(state: AppState) -> Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(120)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid rate limiter configuration".to_string()))?,
    );

    let public_routes = Router::new()
        .route("/api/health", get(auth::health))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_login))
        .with_state(state.clone());

    let user_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/logout-all", post(auth::logout_all))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/sessions", get(auth::my_sessions))
        .route_layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state.clone());

    let staff_routes = Router::new()
        .route("/api/admin/sessions/stats", get(admin::session_stats))
        .route("/api/admin/sessions/inactive", get(admin::inactive_sessions))
        .route("/api/admin/users/{user_id}/sessions", get(admin::user_sessions))
        .route("/api/admin/users/{user_id}/logout", post(admin::force_logout_user))
        .route("/api/admin/sessions/logout", post(admin::force_logout_session))
        .route("/api/admin/sessions/extend", post(admin::extend_session))
        .route_layer(from_fn_with_state(state.clone(), require_staff))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/sessions/cleanup", post(admin::cleanup_sessions))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .merge(user_routes)
        .merge(staff_routes)
        .merge(admin_routes)
        .layer(GovernorLayer::new(governor_conf));

    Ok(Router::new()
        .merge(public_routes)
        .merge(login_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors_layer()))
}
