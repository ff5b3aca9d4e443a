//! Profile job models

use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Lifecycle state of a profiling job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

text_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

impl JobStatus {
    /// Pending and running jobs occupy the per-entity slot
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// The entity a profiling run targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    #[validate(length(min = 1, max = 64, message = "entityType is required"))]
    pub entity_type: String,
    #[validate(length(min = 1, max = 255, message = "entityId is required"))]
    pub entity_id: String,
    pub entity_key: Option<String>,
}

/// A scheduled, running or finished profiling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileJob {
    pub id: Uuid,
    pub tenant_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_key: Option<String>,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub triggered_by: String,
    pub reason: Option<String>,
    pub profile_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProfileJob {
    /// A fresh pending row
    pub fn pending(tenant_id: &str, entity: &EntityRef, request: &ScheduleRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            entity_type: entity.entity_type.clone(),
            entity_id: entity.entity_id.clone(),
            entity_key: entity.entity_key.clone(),
            status: JobStatus::Pending,
            scheduled_at: request.scheduled_at.unwrap_or(now),
            started_at: None,
            finished_at: None,
            last_error: None,
            retry_count: request.retry_count,
            triggered_by: request.triggered_by.clone(),
            reason: request.reason.clone(),
            profile_id: None,
            correlation_id: request.correlation_id.unwrap_or_else(Uuid::new_v4),
            next_retry_at: None,
            created_at: now,
        }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            entity_key: self.entity_key.clone(),
        }
    }
}

/// Parameters of a schedule call beyond the target entity
#[derive(Debug, Clone, Default)]
pub struct ScheduleRequest {
    pub reason: Option<String>,
    pub triggered_by: String,
    pub correlation_id: Option<Uuid>,
    /// Earliest time a worker may start the job; `None` means now
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Failures already consumed by the job's predecessors
    pub retry_count: i32,
}

/// Column changes applied by a single state transition
#[derive(Debug, Clone, Default)]
pub struct JobTransition {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub profile_id: Option<Uuid>,
    pub increment_retry: bool,
    /// Durable retry marker written on `running -> failed`
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When set, the row only matches if `scheduled_at <= due_by`
    pub due_by: Option<DateTime<Utc>>,
}

/// Outcome of a schedule call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Scheduled { job: ProfileJob },
    AlreadyScheduled,
}

/// HTTP body for scheduling a profile run
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJobRequest {
    #[validate(nested)]
    #[serde(flatten)]
    pub entity: EntityRef,
    pub reason: Option<String>,
    #[validate(length(min = 1, max = 128, message = "triggeredBy is required"))]
    pub triggered_by: String,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteJobRequest {
    pub profile_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FailJobRequest {
    #[validate(length(min = 1, message = "error message is required"))]
    pub error: String,
}
