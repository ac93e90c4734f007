use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::config::{Config, StoreBackend};
use crate::crypto::{deterministic::FieldCipher, jwt::TokenService};
use crate::error::Result;
use crate::repositories::{
    memory::{InMemorySessionStore, InMemoryUserDirectory},
    session::{PgSessionStore, SessionStore},
    user::{PgUserDirectory, UserDirectory},
};
use crate::services::{
    auth::{AuthService, SessionLifetimes},
    session::SessionService,
    session_manager::SessionManager,
};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle operations.
    pub sessions: SessionService,
    /// Administrative session operations.
    pub manager: SessionManager,
    /// Sign-in and request authentication.
    pub auth: AuthService,
    /// The Redis connection manager, when login throttling is enabled.
    pub redis: Option<ConnectionManager>,
    /// The application's configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates a new `AppState` from configuration, connecting to the
    /// configured backends.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = match config.database_url.as_deref() {
            Some(url) => {
                let pool = crate::db::create_pool(url)?;
                crate::db::ensure_schema(&pool).await?;
                tracing::info!("✅ PostgreSQL pool initialized with deadpool-postgres");
                Some(pool)
            }
            None => None,
        };

        let store: Arc<dyn SessionStore> = match (config.store_backend, &pool) {
            (StoreBackend::Postgres, Some(pool)) => Arc::new(PgSessionStore::new(pool.clone())),
            (StoreBackend::Postgres, None) => {
                return Err(crate::error::AppError::Internal(
                    "postgres backend selected without DATABASE_URL".to_string(),
                ));
            }
            (StoreBackend::Memory, _) => {
                tracing::warn!("⚠️ Using the in-memory session store; sessions are lost on restart");
                Arc::new(InMemorySessionStore::new())
            }
        };

        let users: Arc<dyn UserDirectory> = match pool {
            Some(pool) => Arc::new(PgUserDirectory::new(pool)),
            None => {
                tracing::warn!("⚠️ No DATABASE_URL; user directory is empty and sign-in will fail");
                Arc::new(InMemoryUserDirectory::new())
            }
        };

        let redis = match config.redis_url.as_deref() {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis Connection Manager initialized (login throttling on)");
                Some(manager)
            }
            None => {
                tracing::warn!("⚠️ REDIS_URL not set; login throttling disabled");
                None
            }
        };

        Ok(Self::from_parts(config.clone(), store, users, redis))
    }

    /// Assembles the state from already-built backends.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        redis: Option<ConnectionManager>,
    ) -> Self {
        let cipher = Arc::new(FieldCipher::new(&config.encryption_key));
        let sessions = SessionService::new(
            store,
            cipher,
            Duration::from_millis(config.store_timeout_ms),
        );
        let tokens = TokenService::new(&config.jwt_secret, config.jwt_issuer.clone());
        let auth = AuthService::new(
            sessions.clone(),
            users,
            tokens,
            SessionLifetimes {
                long_hours: config.session_ttl_hours,
                short_hours: config.short_session_ttl_hours,
            },
        );
        let manager = SessionManager::new(sessions.clone());

        Self {
            sessions,
            manager,
            auth,
            redis,
            config: Arc::new(config),
        }
    }
}
