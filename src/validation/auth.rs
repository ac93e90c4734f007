use garde::Validate;
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    services::session::MAX_SESSION_HOURS,
};

/// The request payload for sign-in.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(email, length(max = 254))]
    pub email: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
    #[serde(default)]
    #[garde(skip)]
    pub remember_me: bool,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("remember_me", &self.remember_me)
            .finish_non_exhaustive()
    }
}

/// The request payload naming a single session.
#[derive(Debug, Deserialize, Validate)]
pub struct SessionTokenRequest {
    #[garde(length(min = 1, max = 128))]
    pub session_token: String,
}

/// The request payload for extending a session.
#[derive(Debug, Deserialize, Validate)]
pub struct ExtendSessionRequest {
    #[garde(length(min = 1, max = 128))]
    pub session_token: String,
    /// Hours added to the current expiry, at most one year.
    #[garde(range(min = 1, max = MAX_SESSION_HOURS))]
    pub additional_hours: i64,
}

/// Query parameters for the inactivity report.
#[derive(Debug, Deserialize, Validate)]
pub struct InactiveQuery {
    #[serde(default = "default_threshold_minutes")]
    #[garde(range(min = 0, max = 525_600))]
    pub threshold_minutes: i64,
}

fn default_threshold_minutes() -> i64 {
    30
}

/// Validates a payload, mapping the report to `AppError::Validation`.
///
/// # Arguments
///
/// * `payload` - The payload to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the payload is valid.
pub fn validate<T>(payload: &T) -> Result<()>
where
    T: Validate,
    T::Context: Default,
{
    payload
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))
}
