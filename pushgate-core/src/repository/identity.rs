//! Read-only access to the system of record for user identity.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::models::{IdentityName, SubjectId};
use crate::Result;

/// A user record as far as the push layer cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub subject_id: SubjectId,
    pub identity_name: IdentityName,
}

/// System-of-record lookup. Implementations must never write.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_subject(&self, subject_id: &SubjectId) -> Result<Option<IdentityRecord>>;
}

/// Postgres-backed identity lookup against the `users` table
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_subject(&self, subject_id: &SubjectId) -> Result<Option<IdentityRecord>> {
        let username: Option<String> = sqlx::query_scalar(
            "SELECT username FROM users WHERE subject_id = $1",
        )
        .bind(subject_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(username.map(|name| IdentityRecord {
            subject_id: subject_id.clone(),
            identity_name: IdentityName::from(name),
        }))
    }
}

impl std::fmt::Debug for PgIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgIdentityStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

/// In-process identity table for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    users: Arc<DashMap<SubjectId, IdentityName>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subject_id: impl Into<SubjectId>, identity: impl Into<IdentityName>) {
        self.users.insert(subject_id.into(), identity.into());
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_subject(&self, subject_id: &SubjectId) -> Result<Option<IdentityRecord>> {
        Ok(self.users.get(subject_id).map(|name| IdentityRecord {
            subject_id: subject_id.clone(),
            identity_name: name.clone(),
        }))
    }
}
