//! Profile job route handlers

use super::extract::{AppJson, AppPath, AppQuery};
use crate::error::{not_found_error, ApiResult};
use crate::models::{
    CompleteJobRequest, EntityRef, FailJobRequest, ProfileJob, ScheduleJobRequest,
    ScheduleOutcome, ScheduleRequest,
};
use crate::state::SharedState;
use crate::tenant::TenantContext;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DueQuery {
    pub limit: Option<usize>,
}

const DEFAULT_DUE_LIMIT: usize = 50;
const MAX_DUE_LIMIT: usize = 500;

/// Load a job, hiding other tenants' jobs behind a 404
async fn tenant_job(state: &SharedState, tenant: &TenantContext, id: Uuid) -> ApiResult<ProfileJob> {
    state
        .scheduler
        .get(id)
        .await?
        .filter(|job| job.tenant_id == tenant.tenant_id)
        .ok_or_else(|| not_found_error(format!("Profile job {} not found", id)))
}

/// Schedule a profiling run. An entity that already has a job in flight
/// answers 200 with `already_scheduled`.
pub async fn schedule_job(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppJson(payload): AppJson<ScheduleJobRequest>,
) -> ApiResult<(StatusCode, Json<ScheduleOutcome>)> {
    payload.validate()?;
    let request = ScheduleRequest {
        reason: payload.reason,
        triggered_by: payload.triggered_by,
        correlation_id: payload.correlation_id,
        ..Default::default()
    };

    let outcome = state
        .scheduler
        .schedule(&tenant.tenant_id, &payload.entity, request)
        .await?;
    let status = match outcome {
        ScheduleOutcome::Scheduled { .. } => StatusCode::CREATED,
        ScheduleOutcome::AlreadyScheduled => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Job history for one entity, newest first
pub async fn job_history(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> ApiResult<Json<Vec<ProfileJob>>> {
    let entity = EntityRef {
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        entity_key: None,
    };
    let jobs = state.scheduler.history(&tenant.tenant_id, &entity).await?;
    Ok(Json(jobs))
}

/// Pending jobs whose scheduled time has passed, oldest first
pub async fn due_jobs(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<DueQuery>,
) -> ApiResult<Json<Vec<ProfileJob>>> {
    let limit = query.limit.unwrap_or(DEFAULT_DUE_LIMIT).min(MAX_DUE_LIMIT);
    let jobs = state
        .scheduler
        .due_jobs(&tenant.tenant_id, Utc::now(), limit)
        .await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<Json<ProfileJob>> {
    Ok(Json(tenant_job(&state, &tenant, id).await?))
}

pub async fn start_job(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<Json<ProfileJob>> {
    tenant_job(&state, &tenant, id).await?;
    Ok(Json(state.scheduler.start(id).await?))
}

pub async fn complete_job(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<CompleteJobRequest>,
) -> ApiResult<Json<ProfileJob>> {
    tenant_job(&state, &tenant, id).await?;
    Ok(Json(state.scheduler.complete(id, payload.profile_id).await?))
}

pub async fn fail_job(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<FailJobRequest>,
) -> ApiResult<Json<ProfileJob>> {
    payload.validate()?;
    tenant_job(&state, &tenant, id).await?;
    Ok(Json(state.scheduler.fail(id, &payload.error).await?))
}
