use chrono::{DateTime, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::user::Role;

/// The public part of the user embedded in a bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUser {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// JWT claims.
///
/// The token is not sufficient on its own: `session_token` must still point
/// at a usable server-side session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub user: TokenUser,
    /// The server-side session this token is bound to.
    #[serde(rename = "sessionToken")]
    pub session_token: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenService {
    pub fn new(secret: &[u8], issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
        }
    }

    /// Issues a token bound to `session_token` that expires with the session.
    pub fn issue(&self, user: TokenUser, session_token: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user.id.clone(),
            user,
            session_token: session_token.to_string(),
            iss: self.issuer.clone(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verifies signature, issuer and expiry.
    ///
    /// Fails with `TokenExpired` or `InvalidToken`; no session lookup happens here.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => {
                tracing::debug!("JWT rejected: {}", e);
                AppError::InvalidToken
            }
        })?;

        if data.claims.session_token.is_empty() {
            return Err(AppError::InvalidToken);
        }

        Ok(data.claims)
    }
}
