use uuid::Uuid;

/// Generates a new opaque session token.
///
/// The same value is carried in the `sessionId` cookie and embedded in the
/// bearer JWT, so it has to stay cookie-safe.
///
/// # Returns
///
/// A hyphenated UUID v4 string.
pub fn generate_session_token() -> String {
    Uuid::new_v4().to_string()
}
