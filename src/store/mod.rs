/// Persistence seams for the session core.
///
/// The credential store and token store are traits so the service can be
/// wired to Postgres in production and to in-memory fakes in tests. Records
/// have a fixed schema and are validated on read by the sqlx row mapping.

mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;

pub use postgres::{PgCredentialStore, PgTokenStore};

/// One registered principal.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

/// One refresh token, stored by digest only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex of the opaque token; unique across all records.
    pub token_hash: String,
    /// Groups the successive rotations of one login session.
    pub family_id: Uuid,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Monotonic: never transitions back to false.
    pub revoked: bool,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub family_id: Uuid,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new credential record. A duplicate email yields
    /// `StoreError::Duplicate`.
    async fn insert(&self, new: NewCredential) -> Result<CredentialRecord, StoreError>;

    /// Case-sensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new refresh-token record. A digest collision yields
    /// `StoreError::Duplicate`; callers regenerate and retry, never reuse.
    async fn create(&self, new: NewRefreshToken) -> Result<RefreshTokenRecord, StoreError>;

    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Conditionally set `revoked = true`. Returns whether THIS call made
    /// the transition; the conditional update is the linearization point
    /// that lets two concurrent rotations of one token elect one winner.
    async fn revoke(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Revoke every live member of a token family. Returns the number of
    /// records transitioned.
    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, StoreError>;

    /// Remove a record outright (logout cleanup). Missing records are fine.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<(), StoreError>;

    /// All records for one principal, newest first.
    async fn find_all_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;

    /// Drop records whose expiry predates `now`. Returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Periodic TTL garbage collection for expired refresh-token records.
pub fn spawn_expiry_purge(store: Arc<dyn TokenStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => {
                    tracing::info!(purged = purged, "Purged expired refresh tokens");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Refresh token purge failed");
                }
            }
        }
    });
}
