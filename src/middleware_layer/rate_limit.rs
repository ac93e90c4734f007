use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::{aio::ConnectionManager, FromRedisValue};
use sonic_rs::JsonValueTrait;

use crate::{error::AppError, state::AppState};

/// Failed attempts allowed per email before sign-in is locked.
pub const MAX_LOGIN_ATTEMPTS: i64 = 5;
/// How long a lock lasts, in seconds.
pub const LOGIN_LOCK_SECS: i64 = 43200;
/// Largest login body the throttle will buffer.
const MAX_LOGIN_BODY: usize = 16 * 1024;

/// Builds the counter key for an email without storing the address itself.
fn login_key(state: &AppState, email: &str) -> String {
    let digest = state
        .sessions
        .cipher()
        .hash_for_search(&email.trim().to_ascii_lowercase());
    format!("rate_limit:login:{}", digest)
}

/// Runs one throttle command. Redis failures are logged and read as `None`,
/// so an unreachable Redis lets sign-in through.
async fn query<T: FromRedisValue>(conn: &ConnectionManager, cmd: &redis::Cmd, name: &'static str) -> Option<T> {
    match cmd.query_async(&mut conn.clone()).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(command = name, error = %e, "⚠️ Login throttle skipped a Redis command");
            None
        }
    }
}

async fn query_pipe<T: FromRedisValue>(conn: &ConnectionManager, pipe: &redis::Pipeline, name: &'static str) -> Option<T> {
    match pipe.query_async(&mut conn.clone()).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(command = name, error = %e, "⚠️ Login throttle skipped a Redis command");
            None
        }
    }
}

fn extract_email_from_body(body_bytes: &[u8]) -> Option<String> {
    let json = sonic_rs::from_slice::<sonic_rs::Value>(body_bytes).ok()?;
    json.get("email").and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// A middleware that rate limits sign-in attempts per email.
///
/// Failed attempts (4xx responses) increment a Redis counter that expires
/// after [`LOGIN_LOCK_SECS`]; a successful sign-in clears it. Passes
/// requests straight through when Redis is not configured.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(conn) = state.redis.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_LOGIN_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body too large".to_string()).into_response();
        }
    };

    let email = extract_email_from_body(&body_bytes).unwrap_or_else(|| "unknown".to_string());
    let key = login_key(&state, &email);

    let count: Option<i64> = query(&conn, redis::cmd("GET").arg(&key), "GET").await.flatten();

    if let Some(attempts) = count {
        if attempts >= MAX_LOGIN_ATTEMPTS {
            let ttl: Option<i64> = query(&conn, redis::cmd("TTL").arg(&key), "TTL").await;

            return AppError::RateLimitExceeded(format!(
                "Too many failed login attempts. Try again in {} minutes",
                ttl.unwrap_or(0).max(0) / 60
            ))
            .into_response();
        }
    }

    let response = next.run(Request::from_parts(parts, Body::from(body_bytes))).await;

    if response.status().is_client_error() {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("INCR")
            .arg(&key)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(LOGIN_LOCK_SECS)
            .ignore();
        let _: Option<()> = query_pipe(&conn, &pipe, "INCR/EXPIRE").await;
    } else if response.status().is_success() {
        let _: Option<()> = query(&conn, redis::cmd("DEL").arg(&key), "DEL").await;
    }

    response
}
