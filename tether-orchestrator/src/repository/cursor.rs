//! Cursor Repository
//!
//! Holds the last acknowledged cursor and its token per (job, session).
//! After initialization the pair is only ever changed by `compare_and_swap`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tether_core::domain::task::CursorState;
use uuid::Uuid;

use super::{StoreResult, cursor_to_db, expiry_from_now};

#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Seed the cursor state for a session, replacing any previous one
    async fn initialize(
        &self,
        job_id: Uuid,
        session_hash: &str,
        state: &CursorState,
        ttl: Duration,
    ) -> StoreResult<()>;

    /// Read the live cursor state
    async fn read(&self, job_id: Uuid, session_hash: &str) -> StoreResult<Option<CursorState>>;

    /// Atomically replace `expected` with `next` and refresh the TTL
    ///
    /// Both the cursor value and the signature must match the stored pair.
    /// Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        session_hash: &str,
        expected: &CursorState,
        next: &CursorState,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Delete expired records, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<u64>;
}

/// Postgres implementation of CursorRepository
pub struct PgCursorRepository {
    pool: PgPool,
}

impl PgCursorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CursorRepository for PgCursorRepository {
    async fn initialize(
        &self,
        job_id: Uuid,
        session_hash: &str,
        state: &CursorState,
        ttl: Duration,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_cursors (job_id, session_hash, cursor_value, cursor_sig, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id, session_hash) DO UPDATE SET
                cursor_value = EXCLUDED.cursor_value,
                cursor_sig = EXCLUDED.cursor_sig,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(job_id)
        .bind(session_hash)
        .bind(cursor_to_db(state.cursor)?)
        .bind(&state.signature)
        .bind(expiry_from_now(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read(&self, job_id: Uuid, session_hash: &str) -> StoreResult<Option<CursorState>> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT cursor_value, cursor_sig
            FROM task_cursors
            WHERE job_id = $1 AND session_hash = $2 AND expires_at > NOW()
            "#,
        )
        .bind(job_id)
        .bind(session_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some((cursor, signature)) = row else {
            return Ok(None);
        };

        match u64::try_from(cursor) {
            Ok(cursor) if !signature.is_empty() => Ok(Some(CursorState { cursor, signature })),
            _ => {
                tracing::warn!("Ignoring malformed cursor state for job {}", job_id);
                Ok(None)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        job_id: Uuid,
        session_hash: &str,
        expected: &CursorState,
        next: &CursorState,
        ttl: Duration,
    ) -> StoreResult<bool> {
        // A single conditional UPDATE: concurrent swaps on the same row
        // serialize on the row lock and the loser re-evaluates the WHERE clause.
        let result = sqlx::query(
            r#"
            UPDATE task_cursors
            SET cursor_value = $5, cursor_sig = $6, expires_at = $7
            WHERE job_id = $1
              AND session_hash = $2
              AND cursor_value = $3
              AND cursor_sig = $4
              AND expires_at > NOW()
            "#,
        )
        .bind(job_id)
        .bind(session_hash)
        .bind(cursor_to_db(expected.cursor)?)
        .bind(&expected.signature)
        .bind(cursor_to_db(next.cursor)?)
        .bind(&next.signature)
        .bind(expiry_from_now(ttl))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM task_cursors WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
