//! Download-event repository for PostgreSQL. Append-only analytics with a
//! retention window enforced by the sweeper.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadRepo: Send + Sync {
    /// Record one successful download issuance. `requester_hash` is the
    /// salted IP hash, never a raw address.
    async fn append(&self, share_id: &str, requester_hash: &str) -> Result<()>;

    /// Drop events older than the retention cutoff. Returns rows removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// PostgreSQL implementation of DownloadRepo.
#[derive(Clone)]
pub struct PgDownloadRepo {
    pool: Pool<Postgres>,
}

impl PgDownloadRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DownloadRepo for PgDownloadRepo {
    async fn append(&self, share_id: &str, requester_hash: &str) -> Result<()> {
        sqlx::query("INSERT INTO download_events (share_id, requester_hash) VALUES ($1, $2)")
            .bind(share_id)
            .bind(requester_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_events WHERE at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
