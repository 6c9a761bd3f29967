//! Repository Module
//!
//! Data access layer for the orchestrator.
//!
//! Every store is trait-based so the poll protocol can run against Postgres
//! in production and against process-local maps in development and tests.

pub mod cursor;
pub mod job;
pub mod memory;
pub mod ownership;
pub mod result;

pub use cursor::{CursorRepository, PgCursorRepository};
pub use job::{JobRepository, PgJobRepository};
pub use memory::MemoryStore;
pub use ownership::{OwnershipRepository, PgOwnershipRepository};
pub use result::{PgResultRepository, ResultRepository};

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Error raised by any store implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The set of stores the services operate on
#[derive(Clone)]
pub struct Stores {
    pub owners: Arc<dyn OwnershipRepository>,
    pub cursors: Arc<dyn CursorRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            owners: Arc::new(PgOwnershipRepository::new(pool.clone())),
            cursors: Arc::new(PgCursorRepository::new(pool.clone())),
            jobs: Arc::new(PgJobRepository::new(pool.clone())),
            results: Arc::new(PgResultRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            owners: store.clone(),
            cursors: store.clone(),
            jobs: store.clone(),
            results: store,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Absolute expiry for a record written now with `ttl`
pub(crate) fn expiry_from_now(ttl: Duration) -> chrono::DateTime<chrono::Utc> {
    let now = chrono::Utc::now();
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

/// Bounds a store call by `limit`
pub(crate) async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    call: impl std::future::Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(operation))?
}

pub(crate) fn cursor_to_db(cursor: u64) -> StoreResult<i64> {
    i64::try_from(cursor).map_err(|_| StoreError::Corrupt(format!("cursor {} out of range", cursor)))
}
