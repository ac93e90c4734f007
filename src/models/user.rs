use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::error::{AppError, Result};

/// A platform role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "user_role")]
pub enum Role {
    #[postgres(name = "user")]
    User,
    #[postgres(name = "mod")]
    Mod,
    #[postgres(name = "admin")]
    Admin,
}

impl Role {
    /// Roles allowed on routes open to any signed-in user.
    pub const ANY: &'static [Role] = &[Role::User, Role::Mod, Role::Admin];
    /// Roles allowed on moderation routes.
    pub const STAFF: &'static [Role] = &[Role::Mod, Role::Admin];
    /// Roles allowed on destructive maintenance routes.
    pub const ADMIN: &'static [Role] = &[Role::Admin];
}

/// A user account, owned by the wider platform and read here.
#[derive(Debug, Clone)]
pub struct UserAccount {
    /// The unique identifier for the user.
    pub id: String,
    /// Search hash of the user's email address.
    pub email_hash: String,
    /// The user's display name.
    pub name: String,
    /// The user's Argon2 password hash.
    pub password_hash: String,
    /// The user's role.
    pub role: Role,
    /// Whether the user is active.
    pub is_active: bool,
}

impl TryFrom<&Row> for UserAccount {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            email_hash: row.try_get("email_hash")?,
            name: row.try_get("name")?,
            password_hash: row.try_get("password_hash")?,
            role: row.try_get("role")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

/// The identity attached to an authenticated request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: String,
    /// Decrypted at resolution time, never stored in plaintext.
    pub email: String,
    pub role: Role,
    pub name: String,
    /// The session token that authenticated this request.
    #[serde(skip)]
    pub session_token: String,
}
