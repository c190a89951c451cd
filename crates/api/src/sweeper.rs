//! Expiry/cleanup engine.
//!
//! A periodic background task enforces the post-condition that nothing is
//! reachable after `expires_at`: due shares are claimed in bounded batches
//! (`FOR UPDATE SKIP LOCKED` underneath, so concurrent instances never
//! collide), transitioned to `expired`, their objects deleted, then
//! transitioned to `deleted`. Failed object deletions stay `expired` and
//! retry with per-share exponential back-off. A retention pass hard-deletes
//! old soft-deleted rows and prunes download events.
//!
//! Request-time expiry checks are by timestamp, so a share is already
//! rejected as `expired` in the window between `expires_at` and the sweep
//! that removes it. The sweeper itself never touches `download_count` and
//! never surfaces errors to end users; it logs and retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{config::Config, metrics::Metrics, repos::Repos, services::ObjectStore};

/// Sweeper tuning, extracted from the server config at startup.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Shares are swept only once this far past expiry, absorbing clock
    /// skew between instances.
    pub grace_secs: i64,
    pub batch: i64,
    pub backoff_base_secs: i64,
    /// Soft deadline per pass; unprocessed claims are picked up next time.
    pub deadline: Duration,
    pub retention_days: i64,
    pub event_retention_days: i64,
}

impl SweepConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            grace_secs: config.sweep_grace_secs,
            batch: config.sweep_batch,
            backoff_base_secs: config.sweep_backoff_base_secs,
            deadline: Duration::from_secs(config.sweep_deadline_secs.max(1)),
            retention_days: config.retention_days,
            event_retention_days: config.download_event_retention_days,
        }
    }
}

/// What one pass accomplished, for the log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
    pub purged: u64,
    pub events_pruned: u64,
    pub bytes_freed: i64,
}

impl SweepReport {
    fn is_empty(&self) -> bool {
        self.deleted == 0 && self.failed == 0 && self.purged == 0 && self.events_pruned == 0
    }
}

pub struct Sweeper {
    repos: Repos,
    storage: Arc<dyn ObjectStore>,
    metrics: Arc<Metrics>,
    cfg: SweepConfig,
}

impl Sweeper {
    pub fn new(
        repos: Repos,
        storage: Arc<dyn ObjectStore>,
        metrics: Arc<Metrics>,
        cfg: SweepConfig,
    ) -> Self {
        Self {
            repos,
            storage,
            metrics,
            cfg,
        }
    }

    /// Run forever at the configured interval.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(report) if !report.is_empty() => {
                    tracing::info!(
                        deleted = report.deleted,
                        failed = report.failed,
                        purged = report.purged,
                        events_pruned = report.events_pruned,
                        bytes_freed = report.bytes_freed,
                        "sweep complete"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::error!("sweep failed: {:?}", err),
            }
        }
    }

    /// One pass. Public for tests and for operational triggering.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let deadline = Instant::now() + self.cfg.deadline;
        let mut report = SweepReport::default();

        let cutoff = now - chrono::Duration::seconds(self.cfg.grace_secs);
        let newly_expired = self.repos.shares.claim_expiring(cutoff, self.cfg.batch).await?;
        let retries = self.repos.shares.claim_retries(now, self.cfg.batch).await?;

        for share in newly_expired.into_iter().chain(retries) {
            if Instant::now() >= deadline {
                // Claims already sit in `expired`; the next pass picks them
                // up as retries.
                break;
            }

            match self.storage.delete(&share.storage_key).await {
                Ok(()) => {
                    if self.repos.shares.mark_deleted(&share.id).await? {
                        report.deleted += 1;
                        report.bytes_freed += share.size_bytes;
                        self.metrics.shares_swept.inc();
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    self.metrics.sweep_failures.inc();
                    let backoff = backoff_secs(self.cfg.backoff_base_secs, share.sweep_attempts);
                    tracing::warn!(
                        share_id = %share.id,
                        attempts = share.sweep_attempts,
                        retry_in_secs = backoff,
                        "object deletion failed: {:?}",
                        err
                    );
                    self.repos
                        .shares
                        .record_sweep_failure(&share.id, now + chrono::Duration::seconds(backoff))
                        .await?;
                }
            }
        }

        let retention_cutoff = now - chrono::Duration::days(self.cfg.retention_days);
        report.purged = self
            .repos
            .shares
            .hard_delete_batch(retention_cutoff, self.cfg.batch)
            .await?;

        let event_cutoff = now - chrono::Duration::days(self.cfg.event_retention_days);
        report.events_pruned = self.repos.downloads.prune_older_than(event_cutoff).await?;

        Ok(report)
    }
}

fn backoff_secs(base: i64, attempts: i32) -> i64 {
    base.saturating_mul(1i64 << attempts.clamp(0, 6) as u32)
}
