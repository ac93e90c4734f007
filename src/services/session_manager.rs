use chrono::{Duration, Utc};

use crate::{
    error::{AppError, Result},
    models::session::{SessionRecord, SessionStats},
    services::session::{bounded_hours, SessionService},
};

/// The window counted by `SessionStats::expiring_within_24h`.
const EXPIRY_HORIZON_HOURS: i64 = 24;

/// Administrative view over the session store.
#[derive(Clone)]
pub struct SessionManager {
    sessions: SessionService,
}

impl SessionManager {
    pub fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }

    /// Counts sessions by state.
    pub async fn get_session_stats(&self) -> Result<SessionStats> {
        let now = Utc::now();
        let stats = self
            .sessions
            .stats(now, now + Duration::hours(EXPIRY_HORIZON_HOURS))
            .await?;
        tracing::debug!(?stats, "📊 Session stats computed");
        Ok(stats)
    }

    /// Lists a user's usable sessions, most recent activity first.
    pub async fn get_user_active_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        self.sessions.list_active_for_user(user_id).await
    }

    /// Signs a user out everywhere.
    pub async fn force_logout_user(&self, user_id: &str) -> Result<u64> {
        tracing::warn!(user_id, "🚫 Forced logout of all user sessions");
        self.sessions.invalidate_all_user_sessions(user_id).await
    }

    /// Signs out a single session.
    pub async fn force_logout_session(&self, session_token: &str) -> Result<Option<SessionRecord>> {
        tracing::warn!("🚫 Forced logout of a single session");
        self.sessions.invalidate_session(session_token).await
    }

    /// Pushes a usable session's expiry back by `additional_hours`.
    ///
    /// The hours are added to the current `expires_at`, so repeated calls
    /// compound. Expired or invalidated sessions are not revived. A single
    /// extension is at most [`MAX_SESSION_HOURS`](crate::services::session::MAX_SESSION_HOURS).
    pub async fn extend_session(&self, session_token: &str, additional_hours: i64) -> Result<Option<SessionRecord>> {
        let additional = bounded_hours(additional_hours, "Extension")?;
        let record = self.sessions.extend(session_token, additional).await?;

        if let Some(ref r) = record {
            tracing::info!(user_id = %r.user_id, expires_at = %r.expires_at, "⏳ Session extended");
        }
        Ok(record)
    }

    /// Usable sessions idle for longer than `threshold_minutes`.
    pub async fn get_inactive_sessions(&self, threshold_minutes: i64) -> Result<Vec<SessionRecord>> {
        if threshold_minutes < 0 {
            return Err(AppError::Validation(
                "Inactivity threshold cannot be negative".to_string(),
            ));
        }

        let cutoff = Duration::try_minutes(threshold_minutes)
            .and_then(|threshold| Utc::now().checked_sub_signed(threshold))
            .ok_or_else(|| AppError::Validation("Inactivity threshold is out of range".to_string()))?;
        self.sessions.inactive_since(cutoff).await
    }
}
