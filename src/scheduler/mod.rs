//! Profile job scheduling
//!
//! At most one pending or running job exists per `(tenant, entity_type, entity_id)`.
//! The storage layer enforces that with a partial unique index; concurrent
//! schedulers race to insert and every loser treats the rejection as success.
//!
//! Lifecycle: `pending -> running -> completed | failed`. Failed jobs with
//! retries left carry a `next_retry_at` marker that the sweeper turns into a
//! new pending job (see [`sweep`]). Runs that outlive the configured timeout
//! are failed by the same sweeper.

pub mod sweep;

pub use sweep::spawn_sweeper;

use crate::config::SchedulerConfig;
use crate::error::AppError;
use crate::models::{EntityRef, JobStatus, JobTransition, ProfileJob, ScheduleOutcome, ScheduleRequest};
use crate::repository::ProfileJobRepository;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Backoff ceiling: one week
const MAX_RETRY_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

pub struct ProfileJobScheduler {
    repo: Arc<dyn ProfileJobRepository>,
    config: SchedulerConfig,
}

impl ProfileJobScheduler {
    pub fn new(repo: Arc<dyn ProfileJobRepository>, config: SchedulerConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue a profiling run for an entity.
    ///
    /// Returns `AlreadyScheduled` when another pending or running job holds the
    /// entity's slot. That is the expected outcome of a lost race, not an error.
    pub async fn schedule(
        &self,
        tenant_id: &str,
        entity: &EntityRef,
        request: ScheduleRequest,
    ) -> Result<ScheduleOutcome, AppError> {
        entity.validate()?;
        if tenant_id.trim().is_empty() {
            return Err(AppError::Validation("tenant id is required".to_string()));
        }

        let job = ProfileJob::pending(tenant_id, entity, &request);
        match self.repo.insert_pending(job).await {
            Ok(job) => {
                info!(
                    tenant_id,
                    entity_type = %job.entity_type,
                    entity_id = %job.entity_id,
                    job_id = %job.id,
                    triggered_by = %job.triggered_by,
                    "Profile job scheduled"
                );
                Ok(ScheduleOutcome::Scheduled { job })
            }
            Err(AppError::Conflict(_)) => {
                info!(
                    tenant_id,
                    entity_type = %entity.entity_type,
                    entity_id = %entity.entity_id,
                    "Profile job already in flight, schedule skipped"
                );
                Ok(ScheduleOutcome::AlreadyScheduled)
            }
            Err(e) => Err(e),
        }
    }

    /// Claim a due pending job
    pub async fn start(&self, job_id: Uuid) -> Result<ProfileJob, AppError> {
        let now = Utc::now();
        let change = JobTransition {
            started_at: Some(now),
            due_by: Some(now),
            ..Default::default()
        };
        let job = self.apply(job_id, JobStatus::Pending, JobStatus::Running, change).await?;
        debug!(job_id = %job.id, "Profile job started");
        Ok(job)
    }

    pub async fn complete(&self, job_id: Uuid, profile_id: Uuid) -> Result<ProfileJob, AppError> {
        let change = JobTransition {
            finished_at: Some(Utc::now()),
            profile_id: Some(profile_id),
            ..Default::default()
        };
        let job = self
            .apply(job_id, JobStatus::Running, JobStatus::Completed, change)
            .await?;
        info!(job_id = %job.id, profile_id = %profile_id, "Profile job completed");
        Ok(job)
    }

    /// Record a failed run. While retries remain, the row gets a durable
    /// `next_retry_at` marker for the sweeper to pick up.
    pub async fn fail(&self, job_id: Uuid, error_message: &str) -> Result<ProfileJob, AppError> {
        let current = self
            .repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| job_not_found(job_id))?;

        let now = Utc::now();
        let attempts = current.retry_count + 1;
        let next_retry_at = if attempts < self.config.max_retries {
            Some(now + self.retry_delay(attempts))
        } else {
            None
        };

        let change = JobTransition {
            finished_at: Some(now),
            last_error: Some(error_message.to_string()),
            increment_retry: true,
            next_retry_at,
            ..Default::default()
        };
        let job = self.apply(job_id, JobStatus::Running, JobStatus::Failed, change).await?;

        match job.next_retry_at {
            Some(retry_at) => warn!(
                job_id = %job.id,
                retry_count = job.retry_count,
                retry_at = %retry_at,
                error = error_message,
                "Profile job failed, retry queued"
            ),
            None => error!(
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                entity_type = %job.entity_type,
                entity_id = %job.entity_id,
                retry_count = job.retry_count,
                error = error_message,
                "Profile job failed permanently, manual intervention required"
            ),
        }
        Ok(job)
    }

    /// A tenant's pending jobs ready to be claimed, oldest first
    pub async fn due_jobs(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProfileJob>, AppError> {
        self.repo.list_due(tenant_id, now, limit).await
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Option<ProfileJob>, AppError> {
        self.repo.find_by_id(job_id).await
    }

    /// Every job recorded for an entity, newest first
    pub async fn history(&self, tenant_id: &str, entity: &EntityRef) -> Result<Vec<ProfileJob>, AppError> {
        self.repo
            .list_for_entity(tenant_id, &entity.entity_type, &entity.entity_id)
            .await
    }

    async fn apply(
        &self,
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
        change: JobTransition,
    ) -> Result<ProfileJob, AppError> {
        if let Some(job) = self.repo.transition(job_id, from, to, change).await? {
            return Ok(job);
        }

        // The conditional update matched nothing; report why
        match self.repo.find_by_id(job_id).await? {
            None => Err(job_not_found(job_id)),
            Some(job) if job.status == from => Err(AppError::InvalidTransition(format!(
                "Profile job {} is not due until {}",
                job_id, job.scheduled_at
            ))),
            Some(job) => Err(AppError::InvalidTransition(format!(
                "Profile job {} is {}, expected {}",
                job_id, job.status, from
            ))),
        }
    }

    /// Exponential backoff from the base delay, plus up to half a base of jitter
    fn retry_delay(&self, attempt: i32) -> chrono::Duration {
        let base = self.config.retry_base_delay_secs;
        let exponent = (attempt - 1).clamp(0, 16) as u32;
        let backoff = base.saturating_mul(1u64 << exponent);
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        let secs = backoff.saturating_add(jitter).min(MAX_RETRY_DELAY_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

fn job_not_found(job_id: Uuid) -> AppError {
    AppError::NotFound(format!("Profile job {} not found", job_id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use pretty_assertions::assert_eq;

    pub(crate) fn scheduler_with(config: SchedulerConfig) -> Arc<ProfileJobScheduler> {
        Arc::new(ProfileJobScheduler::new(Arc::new(MemoryStore::new()), config))
    }

    pub(crate) fn scheduler() -> Arc<ProfileJobScheduler> {
        scheduler_with(SchedulerConfig {
            retry_base_delay_secs: 0,
            ..Default::default()
        })
    }

    pub(crate) fn orders() -> EntityRef {
        EntityRef {
            entity_type: "table".to_string(),
            entity_id: "public.orders".to_string(),
            entity_key: Some("orders".to_string()),
        }
    }

    pub(crate) fn request(triggered_by: &str) -> ScheduleRequest {
        ScheduleRequest {
            triggered_by: triggered_by.to_string(),
            ..Default::default()
        }
    }

    pub(crate) async fn scheduled(s: &ProfileJobScheduler, tenant_id: &str) -> ProfileJob {
        match s.schedule(tenant_id, &orders(), request("test")).await.unwrap() {
            ScheduleOutcome::Scheduled { job } => job,
            ScheduleOutcome::AlreadyScheduled => panic!("expected a new job"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_schedules_create_exactly_one_job() {
        let s = scheduler();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = s.clone();
                tokio::spawn(async move {
                    s.schedule("t1", &orders(), request(&format!("caller-{}", i))).await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ScheduleOutcome::Scheduled { .. } => created += 1,
                ScheduleOutcome::AlreadyScheduled => {}
            }
        }

        assert_eq!(created, 1);
        assert_eq!(s.history("t1", &orders()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slot_is_per_tenant() {
        let s = scheduler();
        scheduled(&s, "t1").await;
        scheduled(&s, "t2").await;
    }

    #[tokio::test]
    async fn test_reschedule_after_terminal_state() {
        let s = scheduler();
        let job = scheduled(&s, "t1").await;
        s.start(job.id).await.unwrap();
        assert_eq!(
            s.schedule("t1", &orders(), request("again")).await.unwrap(),
            ScheduleOutcome::AlreadyScheduled
        );

        s.complete(job.id, Uuid::new_v4()).await.unwrap();
        let second = scheduled(&s, "t1").await;

        s.start(second.id).await.unwrap();
        s.fail(second.id, "boom").await.unwrap();
        scheduled(&s, "t1").await;

        assert_eq!(s.history("t1", &orders()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transitions_are_checked() {
        let s = scheduler();
        let job = scheduled(&s, "t1").await;

        let err = s.complete(job.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let running = s.start(job.id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.started_at.is_some());
        assert!(matches!(s.start(job.id).await.unwrap_err(), AppError::InvalidTransition(_)));

        let done = s.complete(job.id, Uuid::nil()).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.profile_id, Some(Uuid::nil()));

        assert!(matches!(
            s.start(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_future_job_cannot_be_claimed_early() {
        let s = scheduler();
        let later = ScheduleRequest {
            triggered_by: "test".to_string(),
            scheduled_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        let job = match s.schedule("t1", &orders(), later).await.unwrap() {
            ScheduleOutcome::Scheduled { job } => job,
            other => panic!("unexpected {:?}", other),
        };

        assert!(matches!(s.start(job.id).await.unwrap_err(), AppError::InvalidTransition(_)));
        assert!(s.due_jobs("t1", Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_sets_durable_retry_marker() {
        let s = scheduler_with(SchedulerConfig {
            retry_base_delay_secs: 60,
            ..Default::default()
        });
        let job = scheduled(&s, "t1").await;
        s.start(job.id).await.unwrap();

        let before = Utc::now();
        let failed = s.fail(job.id, "connection reset").await.unwrap();

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.last_error.as_deref(), Some("connection reset"));
        let retry_at = failed.next_retry_at.unwrap();
        assert!(retry_at >= before + chrono::Duration::seconds(60));
        assert!(retry_at <= Utc::now() + chrono::Duration::seconds(90));
    }

    #[tokio::test]
    async fn test_last_retry_is_terminal() {
        let s = scheduler_with(SchedulerConfig {
            max_retries: 1,
            ..Default::default()
        });
        let job = scheduled(&s, "t1").await;
        s.start(job.id).await.unwrap();

        let failed = s.fail(job.id, "bad data").await.unwrap();
        assert_eq!(failed.retry_count, 1);
        assert!(failed.next_retry_at.is_none());
    }

    #[test]
    fn test_retry_delay_grows() {
        let s = ProfileJobScheduler::new(Arc::new(MemoryStore::new()), SchedulerConfig::default());
        let first = s.retry_delay(1).num_seconds();
        let third = s.retry_delay(3).num_seconds();
        assert!((60..=90).contains(&first));
        assert!((240..=270).contains(&third));
    }
}
