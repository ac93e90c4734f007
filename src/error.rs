use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crypto::deterministic::CipherError;

/// The fixed message returned on role failures. Never names the roles that
/// would have been accepted.
pub const INSUFFICIENT_PRIVILEGES_MESSAGE: &str = "Admin access required";

/// The application's error type.
///
/// A missing session is not an error: lookups return `Ok(None)`. Everything
/// here is either a rejection or a failure, and failures are never folded
/// into "not found" or "unauthenticated".
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored ciphertext could not be decrypted under the configured key.
    #[error("Decryption error: {0}")]
    Decryption(#[from] CipherError),

    /// A store call exceeded its deadline.
    #[error("Session store timed out during {0}")]
    StoreTimeout(&'static str),

    /// Another session already holds this token.
    #[error("Session token already exists")]
    DuplicateToken,

    /// The bearer token is malformed or its signature does not verify.
    #[error("Invalid token")]
    InvalidToken,

    /// The bearer token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// No usable session was presented.
    #[error("Authentication required")]
    Unauthenticated,

    /// The session is valid but its role is not allowed on this route.
    #[error("{}", INSUFFICIENT_PRIVILEGES_MESSAGE)]
    InsufficientPrivileges,

    /// Sign-in credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Redis(_)
            | AppError::Decryption(_)
            | AppError::StoreTimeout(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DuplicateToken => StatusCode::CONFLICT,
            AppError::InvalidToken
            | AppError::TokenExpired
            | AppError::Unauthenticated
            | AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPrivileges => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                "Database error".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }

            AppError::Decryption(ref e) => {
                tracing::error!(
                    "Session field decryption failed ({}); was SESSION_ENCRYPTION_KEY rotated?",
                    e
                );
                "Internal server error".to_string()
            }

            AppError::StoreTimeout(op) => {
                tracing::error!("Session store timed out during {}", op);
                "Session store unavailable".to_string()
            }

            AppError::DuplicateToken => {
                tracing::warn!("Duplicate session token surfaced to a handler");
                "Please retry".to_string()
            }

            AppError::InvalidToken => {
                tracing::debug!("Rejected invalid bearer token");
                "Invalid token".to_string()
            }

            AppError::TokenExpired => {
                tracing::debug!("Rejected expired bearer token");
                "Token expired".to_string()
            }

            AppError::Unauthenticated => {
                tracing::debug!("No usable session");
                "Authentication required".to_string()
            }

            AppError::InsufficientPrivileges => {
                tracing::warn!("Role check failed");
                INSUFFICIENT_PRIVILEGES_MESSAGE.to_string()
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                "Resource not found".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                msg.clone()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
