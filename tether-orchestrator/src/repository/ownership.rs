//! Ownership Repository
//!
//! Maps a job to the caller and session hash allowed to poll it.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tether_core::domain::task::OwnershipRecord;
use uuid::Uuid;

use super::{StoreResult, expiry_from_now};

#[async_trait]
pub trait OwnershipRepository: Send + Sync {
    /// Write the ownership record for a job, replacing any previous one
    async fn record(&self, record: &OwnershipRecord, ttl: Duration) -> StoreResult<()>;

    /// Find the live ownership record for a job
    async fn find(&self, job_id: Uuid) -> StoreResult<Option<OwnershipRecord>>;

    /// Delete expired records, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<u64>;
}

/// Postgres implementation of OwnershipRepository
pub struct PgOwnershipRepository {
    pool: PgPool,
}

impl PgOwnershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnershipRepository for PgOwnershipRepository {
    async fn record(&self, record: &OwnershipRecord, ttl: Duration) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_owners (job_id, caller_id, session_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO UPDATE SET
                caller_id = EXCLUDED.caller_id,
                session_hash = EXCLUDED.session_hash,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(record.job_id)
        .bind(&record.caller_id)
        .bind(&record.session_hash)
        .bind(record.created_at)
        .bind(expiry_from_now(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, job_id: Uuid) -> StoreResult<Option<OwnershipRecord>> {
        let row = sqlx::query_as::<_, OwnerRow>(
            r#"
            SELECT job_id, caller_id, session_hash, created_at
            FROM task_owners
            WHERE job_id = $1 AND expires_at > NOW()
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM task_owners WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct OwnerRow {
    job_id: Uuid,
    caller_id: String,
    session_hash: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<OwnerRow> for OwnershipRecord {
    fn from(row: OwnerRow) -> Self {
        OwnershipRecord {
            job_id: row.job_id,
            caller_id: row.caller_id,
            session_hash: row.session_hash,
            created_at: row.created_at,
        }
    }
}
