//! Identity store.
//!
//! Every write that must be atomic (identity creation against the email
//! uniqueness, KYC attachment with the verification flag) is a single
//! [`Store`] call, so implementations can wrap it in one transaction.
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use chrono::{DateTime, Utc};

use crate::AppState;
use crate::error::Result;
use crate::kyc::{KycProfile, NewKycProfile};
use crate::user::{Identity, NewIdentity};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "identa";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Persisted refresh token, looked up by digest.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshToken {
    pub user_id: i64,
    pub expire_at: DateTime<Utc>,
}

/// Persistence port for identities, KYC profiles and refresh tokens.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new identity.
    ///
    /// Fails with [`crate::ServerError::EmailTaken`] when the email is in use.
    async fn insert_identity(&self, identity: NewIdentity) -> Result<Identity>;

    /// Find an identity using its `id`.
    async fn find_identity_by_id(&self, id: i64) -> Result<Option<Identity>>;

    /// Find an identity using its normalized `email`.
    async fn find_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>>;

    /// Record a successful login.
    async fn touch_last_login(&self, id: i64) -> Result<()>;

    /// Create the KYC profile of `user_id` and set its verification flag.
    ///
    /// Fails with [`crate::ServerError::KycAlreadySubmitted`] when a profile
    /// already exists, leaving the identity untouched.
    async fn attach_kyc(
        &self,
        user_id: i64,
        kyc: NewKycProfile,
    ) -> Result<KycProfile>;

    /// Find the KYC profile of `user_id`.
    async fn find_kyc(&self, user_id: i64) -> Result<Option<KycProfile>>;

    /// Save a refresh token digest.
    async fn insert_refresh_token(
        &self,
        digest: &str,
        user_id: i64,
        expire_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Find a refresh token using its digest.
    async fn find_refresh_token(
        &self,
        digest: &str,
    ) -> Result<Option<RefreshToken>>;

    /// Delete a refresh token using its digest.
    async fn delete_refresh_token(&self, digest: &str) -> Result<()>;

    /// Delete every refresh token expiring at or before `now`.
    ///
    /// Returns how many were removed.
    async fn purge_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub store: Arc<dyn Store>,
}

impl Database {
    /// Init PostgreSQL connections and run migrations.
    pub async fn postgres(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> std::result::Result<Self, sqlx::Error> {
        let store = PgStore::connect(hostname, username, password, db, pool)
            .await?;
        store.migrate().await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// Init PostgreSQL from the `postgres` entry of `config.yaml`.
    pub async fn from_config(
        config: &crate::config::Postgres,
    ) -> std::result::Result<Self, sqlx::Error> {
        Self::postgres(
            &config.address,
            config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
            config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
            config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
            config.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
        )
        .await
    }

    /// In-process store, lost on shutdown.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
