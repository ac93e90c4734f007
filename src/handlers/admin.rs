use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    models::session::{SessionStats, SessionSummary},
    models::user::AuthenticatedUser,
    state::AppState,
    validation::auth::{validate, ExtendSessionRequest, InactiveQuery, SessionTokenRequest},
};

/// The response payload for bulk operations.
#[derive(Serialize)]
pub struct CountResponse {
    pub success: bool,
    pub count: u64,
}

fn summaries(records: &[crate::models::session::SessionRecord]) -> Vec<SessionSummary> {
    records.iter().map(SessionSummary::from).collect()
}

/// Returns aggregate session counts.
pub async fn session_stats(State(state): State<AppState>) -> Result<Json<SessionStats>> {
    Ok(Json(state.manager.get_session_stats().await?))
}

/// Lists usable sessions idle for longer than `threshold_minutes`.
#[axum::debug_handler]
pub async fn inactive_sessions(
    State(state): State<AppState>,
    Query(query): Query<InactiveQuery>,
) -> Result<Json<Vec<SessionSummary>>> {
    validate(&query)?;
    let records = state.manager.get_inactive_sessions(query.threshold_minutes).await?;
    Ok(Json(summaries(&records)))
}

/// Lists a user's active sessions.
#[axum::debug_handler]
pub async fn user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<SessionSummary>>> {
    let records = state.manager.get_user_active_sessions(&user_id).await?;
    Ok(Json(summaries(&records)))
}

/// Signs a user out everywhere.
#[axum::debug_handler]
pub async fn force_logout_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthenticatedUser>,
    Path(user_id): Path<String>,
) -> Result<Json<CountResponse>> {
    tracing::warn!(admin_id = %admin.id, target_user = %user_id, "🚫 Admin forced logout");
    let count = state.manager.force_logout_user(&user_id).await?;
    Ok(Json(CountResponse { success: true, count }))
}

/// Signs out a single session.
#[axum::debug_handler]
pub async fn force_logout_session(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthenticatedUser>,
    Json(payload): Json<SessionTokenRequest>,
) -> Result<Json<SessionSummary>> {
    validate(&payload)?;
    tracing::warn!(admin_id = %admin.id, "🚫 Admin forced session logout");
    let record = state
        .manager
        .force_logout_session(&payload.session_token)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(SessionSummary::from(&record)))
}

/// Pushes a session's expiry back.
#[axum::debug_handler]
pub async fn extend_session(
    State(state): State<AppState>,
    Json(payload): Json<ExtendSessionRequest>,
) -> Result<Json<SessionSummary>> {
    validate(&payload)?;
    let record = state
        .manager
        .extend_session(&payload.session_token, payload.additional_hours)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(SessionSummary::from(&record)))
}

/// Runs the expiry sweep now.
pub async fn cleanup_sessions(State(state): State<AppState>) -> Result<Json<CountResponse>> {
    let count = state.sessions.cleanup_expired_sessions().await?;
    Ok(Json(CountResponse { success: true, count }))
}
