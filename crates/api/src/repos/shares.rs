//! Share repository for PostgreSQL.
//!
//! The share state machine lives here: every transition is a conditional
//! update so concurrent writers cannot skip states, and the sweeper's batch
//! claims use `FOR UPDATE SKIP LOCKED` so multiple instances never process
//! the same share twice.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Share, ShareState};

/// Fields needed to insert a share in `pending_upload`.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub id: String,
    pub owner_user_id: Option<Uuid>,
    pub storage_key: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub password_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Per-owner storage accounting, used for quota and in-flight caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerUsage {
    pub used_bytes: i64,
    pub active_shares: i64,
    pub pending_uploads: i64,
}

/// Outcome of an owner revoking a share.
#[derive(Debug, Clone)]
pub enum RevokeOutcome {
    /// Transitioned to `expired`; the caller owns object deletion.
    Revoked(Share),
    NotFound,
    NotOwner,
    /// Already expired or deleted.
    InvalidState(ShareState),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShareRepo: Send + Sync {
    /// Insert a new share in `pending_upload`. A primary-key collision here
    /// means the ID generator is broken and surfaces as an error.
    async fn create_pending(&self, share: &NewShare) -> Result<Share>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Share>>;

    /// `pending_upload → available`, recording the verified object size.
    /// Returns None when the share is not pending.
    async fn mark_available(&self, id: &str, size_bytes: i64) -> Result<Option<Share>>;

    /// Give up on a pending upload (object never arrived or mismatched):
    /// `pending_upload → expired`, handing the share to the cleanup path.
    async fn abandon_pending(&self, id: &str) -> Result<bool>;

    /// Atomically verify the share is `available` and unexpired, and bump
    /// `download_count`. Returns the updated share, or None when the guard
    /// fails; the caller re-reads to distinguish why.
    async fn issue_download(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Share>>;

    /// Owner's shares, newest first. Soft-deleted rows are excluded.
    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Share>>;

    /// Set or clear the password hash. Owner-scoped; only live shares
    /// qualify. Returns false when nothing matched.
    async fn set_password_hash(&self, id: &str, owner: Uuid, hash: Option<String>)
        -> Result<bool>;

    async fn usage_by_owner(&self, owner: Uuid) -> Result<OwnerUsage>;

    /// Owner-initiated teardown: `pending_upload|available → expired` so the
    /// standard cleanup path finishes the job.
    async fn begin_revoke(&self, id: &str, owner: Uuid) -> Result<RevokeOutcome>;

    /// Claim a batch of shares past `cutoff` and transition them to
    /// `expired` in one statement. Safe to run from multiple sweeper
    /// instances concurrently.
    async fn claim_expiring(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Share>>;

    /// Claim `expired` shares whose object deletion is due for another
    /// attempt, bumping their attempt counter.
    async fn claim_retries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Share>>;

    /// `expired → deleted` after the object is gone.
    async fn mark_deleted(&self, id: &str) -> Result<bool>;

    /// Object deletion failed; schedule the next attempt.
    async fn record_sweep_failure(&self, id: &str, next_attempt: DateTime<Utc>) -> Result<()>;

    /// Purge `deleted` rows older than the retention window. Returns the
    /// number of rows removed.
    async fn hard_delete_batch(&self, older_than: DateTime<Utc>, limit: i64) -> Result<u64>;
}

/// PostgreSQL implementation of ShareRepo.
#[derive(Clone)]
pub struct PgShareRepo {
    pool: Pool<Postgres>,
}

impl PgShareRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShareRepo for PgShareRepo {
    async fn create_pending(&self, share: &NewShare) -> Result<Share> {
        let row = sqlx::query_as::<_, Share>(
            r#"
            INSERT INTO shares
                (id, owner_user_id, storage_key, original_name, size_bytes,
                 mime_type, password_hash, expires_at, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending_upload')
            RETURNING *
            "#,
        )
        .bind(&share.id)
        .bind(share.owner_user_id)
        .bind(&share.storage_key)
        .bind(&share.original_name)
        .bind(share.size_bytes)
        .bind(&share.mime_type)
        .bind(&share.password_hash)
        .bind(share.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(share)
    }

    async fn mark_available(&self, id: &str, size_bytes: i64) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>(
            r#"
            UPDATE shares SET state = 'available', size_bytes = $2
            WHERE id = $1 AND state = 'pending_upload'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(size_bytes)
        .fetch_optional(&self.pool)
        .await?;
        Ok(share)
    }

    async fn abandon_pending(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shares SET state = 'expired', sweep_attempts = 0, next_sweep_at = NULL
            WHERE id = $1 AND state = 'pending_upload'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn issue_download(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>(
            r#"
            UPDATE shares SET download_count = download_count + 1
            WHERE id = $1 AND state = 'available' AND expires_at > $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(share)
    }

    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Share>> {
        let shares = sqlx::query_as::<_, Share>(
            r#"
            SELECT * FROM shares
            WHERE owner_user_id = $1 AND state != 'deleted'
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(shares)
    }

    async fn set_password_hash(
        &self,
        id: &str,
        owner: Uuid,
        hash: Option<String>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shares SET password_hash = $3
            WHERE id = $1 AND owner_user_id = $2
              AND state IN ('pending_upload', 'available')
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn usage_by_owner(&self, owner: Uuid) -> Result<OwnerUsage> {
        let (used_bytes, active_shares, pending_uploads): (i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(size_bytes) FILTER (WHERE state = 'available'), 0)::BIGINT,
                    COUNT(*) FILTER (WHERE state = 'available'),
                    COUNT(*) FILTER (WHERE state = 'pending_upload')
                FROM shares
                WHERE owner_user_id = $1
                "#,
            )
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;
        Ok(OwnerUsage {
            used_bytes,
            active_shares,
            pending_uploads,
        })
    }

    async fn begin_revoke(&self, id: &str, owner: Uuid) -> Result<RevokeOutcome> {
        let mut tx = self.pool.begin().await?;

        let share = sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(share) = share else {
            return Ok(RevokeOutcome::NotFound);
        };
        if share.owner_user_id != Some(owner) {
            return Ok(RevokeOutcome::NotOwner);
        }
        if !matches!(
            share.state,
            ShareState::PendingUpload | ShareState::Available
        ) {
            return Ok(RevokeOutcome::InvalidState(share.state));
        }

        let revoked = sqlx::query_as::<_, Share>(
            r#"
            UPDATE shares
            SET state = 'expired', sweep_attempts = 0, next_sweep_at = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RevokeOutcome::Revoked(revoked))
    }

    async fn claim_expiring(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Share>> {
        let shares = sqlx::query_as::<_, Share>(
            r#"
            WITH due AS (
                SELECT id FROM shares
                WHERE state IN ('pending_upload', 'available') AND expires_at <= $1
                ORDER BY expires_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE shares s
            SET state = 'expired', sweep_attempts = 0, next_sweep_at = NULL
            FROM due
            WHERE s.id = due.id
            RETURNING s.*
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(shares)
    }

    async fn claim_retries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Share>> {
        let shares = sqlx::query_as::<_, Share>(
            r#"
            WITH due AS (
                SELECT id FROM shares
                WHERE state = 'expired'
                  AND (next_sweep_at IS NULL OR next_sweep_at <= $1)
                ORDER BY next_sweep_at NULLS FIRST
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE shares s
            SET sweep_attempts = s.sweep_attempts + 1
            FROM due
            WHERE s.id = due.id
            RETURNING s.*
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(shares)
    }

    async fn mark_deleted(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shares SET state = 'deleted', deleted_at = now()
            WHERE id = $1 AND state = 'expired'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_sweep_failure(&self, id: &str, next_attempt: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE shares SET next_sweep_at = $2 WHERE id = $1 AND state = 'expired'")
            .bind(id)
            .bind(next_attempt)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn hard_delete_batch(&self, older_than: DateTime<Utc>, limit: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM shares
            WHERE id IN (
                SELECT id FROM shares
                WHERE state = 'deleted' AND deleted_at <= $1
                LIMIT $2
            )
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
