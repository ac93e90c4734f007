use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::{error::Result, models::user::UserAccount};

/// Read access to the platform's user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by their ID.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserAccount>>;

    /// Finds a user by the search hash of their email address.
    async fn find_by_email_hash(&self, email_hash: &str) -> Result<Option<UserAccount>>;
}

/// PostgreSQL-backed user directory.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool,
}

impl PgUserDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserAccount>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, email_hash, name, password_hash, role, is_active
                FROM users
                WHERE id = $1
                "#,
                &[&user_id],
            )
            .await?;
        row.map(|r| UserAccount::try_from(&r)).transpose()
    }

    async fn find_by_email_hash(&self, email_hash: &str) -> Result<Option<UserAccount>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, email_hash, name, password_hash, role, is_active
                FROM users
                WHERE email_hash = $1
                "#,
                &[&email_hash],
            )
            .await?;
        row.map(|r| UserAccount::try_from(&r)).transpose()
    }
}
