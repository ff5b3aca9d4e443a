//! Background sweeps over the job table
//!
//! Retries are never held in memory. A failed job with retries left keeps a
//! `next_retry_at` marker in storage; each sweep pass converts due markers into
//! pending successor jobs, so a restart loses nothing. Running jobs whose
//! claim is older than the run timeout are failed here as well, which feeds
//! them into the same retry path.

use super::ProfileJobScheduler;
use crate::error::AppError;
use crate::models::{ScheduleOutcome, ScheduleRequest};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// `triggered_by` value stamped on retry successors
pub const RETRY_TRIGGER: &str = "retry_sweep";

/// Upper bound on rows handled per pass by each sweep
const SWEEP_BATCH: usize = 100;

impl ProfileJobScheduler {
    /// Turn due retry markers into pending jobs.
    ///
    /// The successor inherits the retry count and correlation id. The marker is
    /// cleared only after the successor exists (or the slot is already taken),
    /// so a crash mid-pass repeats the work instead of dropping it.
    pub async fn sweep_retries(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let due = self.repo.list_retry_due(now, SWEEP_BATCH).await?;
        let mut rescheduled = 0;

        for failed in due {
            let request = ScheduleRequest {
                reason: failed.reason.clone(),
                triggered_by: RETRY_TRIGGER.to_string(),
                correlation_id: Some(failed.correlation_id),
                scheduled_at: failed.next_retry_at,
                retry_count: failed.retry_count,
            };

            match self.schedule(&failed.tenant_id, &failed.entity(), request).await {
                Ok(ScheduleOutcome::Scheduled { job }) => {
                    debug!(failed_job = %failed.id, retry_job = %job.id, "Retry scheduled");
                    rescheduled += 1;
                }
                Ok(ScheduleOutcome::AlreadyScheduled) => {
                    debug!(failed_job = %failed.id, "Entity already has an active job, retry folded in");
                }
                Err(e) => {
                    // Marker stays; the next pass tries this row again
                    error!(failed_job = %failed.id, "Could not schedule retry: {}", e);
                    continue;
                }
            }
            if let Err(e) = self.repo.clear_retry_marker(failed.id).await {
                error!(failed_job = %failed.id, "Could not clear retry marker: {}", e);
            }
        }

        if rescheduled > 0 {
            info!("Retry sweep rescheduled {} profile job(s)", rescheduled);
        }
        Ok(rescheduled)
    }

    /// Fail running jobs claimed longer than the run timeout ago
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let timeout = self.config.run_timeout();
        let cutoff = now - chrono::Duration::seconds(self.config.run_timeout_secs as i64);
        let stale = self.repo.list_running_started_before(cutoff, SWEEP_BATCH).await?;
        let mut failed = 0;

        for job in stale {
            let message = format!("Profiling timed out after {}ms", timeout.as_millis());
            match self.fail(job.id, &message).await {
                Ok(_) => failed += 1,
                // Finished between the scan and the update
                Err(AppError::InvalidTransition(_)) | Err(AppError::NotFound(_)) => {
                    debug!(job_id = %job.id, "Timed-out job already left running");
                }
                Err(e) => error!(job_id = %job.id, "Could not fail timed-out job: {}", e),
            }
        }

        if failed > 0 {
            warn!("Timeout sweep failed {} stale profile job(s)", failed);
        }
        Ok(failed)
    }

    /// Delete terminal jobs older than the retention window
    pub async fn sweep_retention(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = now - chrono::Duration::days(self.config.retention_days);
        let removed = self.repo.delete_finished_before(cutoff).await?;
        if removed > 0 {
            info!("Retention sweep removed {} profile job(s) finished before {}", removed, cutoff);
        }
        Ok(removed)
    }

    /// One full sweeper pass. Failures are logged; the next tick tries again.
    pub async fn run_sweeps(&self, now: DateTime<Utc>) {
        if let Err(e) = self.sweep_timeouts(now).await {
            error!("Timeout sweep failed: {}", e);
        }
        if let Err(e) = self.sweep_retries(now).await {
            error!("Retry sweep failed: {}", e);
        }
        if let Err(e) = self.sweep_retention(now).await {
            error!("Retention sweep failed: {}", e);
        }
    }
}

/// Run the sweeps on a fixed interval for the lifetime of the process
pub fn spawn_sweeper(scheduler: Arc<ProfileJobScheduler>) -> JoinHandle<()> {
    let period = scheduler.config().sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            scheduler.run_sweeps(Utc::now()).await;
        }
    })
}
