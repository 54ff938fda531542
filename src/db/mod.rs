pub mod config;
pub mod memory;
pub mod models;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::config::{DbConfig, DbConfigError};
pub use crate::db::memory::MemoryStore;
pub use crate::db::models::{Attempt, MasteryRecord, ReviewItem, Versioned, MAX_TIME_SPENT_MS};
pub use crate::db::sqlite::SqliteStore;

/// Durable storage the engine reads from and writes to.
///
/// Writes are compare-and-put: `expected_version` is the version returned by
/// the read the caller computed from, or `None` when the caller saw no row.
/// A mismatch fails with [`StoreError::Conflict`] and leaves the row untouched.
#[async_trait]
pub trait PracticeStore: Send + Sync {
    async fn get_mastery(
        &self,
        learner_id: &str,
        skill_id: &str,
    ) -> Result<Option<Versioned<MasteryRecord>>, StoreError>;

    async fn put_mastery(
        &self,
        record: &MasteryRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    async fn list_mastery(&self, learner_id: &str) -> Result<Vec<MasteryRecord>, StoreError>;

    async fn get_review_item(
        &self,
        learner_id: &str,
        question_id: &str,
    ) -> Result<Option<Versioned<ReviewItem>>, StoreError>;

    async fn put_review_item(
        &self,
        item: &ReviewItem,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Items with `due_at <= now`, oldest due first, at most `limit`.
    async fn due_review_items(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ReviewItem>, StoreError>;

    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StoreError>;

    async fn list_attempts(
        &self,
        learner_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<Attempt>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict on {key}")]
    Conflict { key: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("value out of range for storage: {0}")]
    OutOfRange(String),
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Picks the backing store from configuration: SQLite when a database URL is
/// configured, the in-memory store otherwise.
pub async fn connect_from_config(config: &DbConfig) -> Result<Arc<dyn PracticeStore>, DbInitError> {
    match &config.database_url {
        Some(url) => {
            let store = SqliteStore::connect(url, &config.sqlite).await?;
            tracing::info!(url = %url, "sqlite store ready");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
