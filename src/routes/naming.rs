//! Naming variant route handlers

use super::extract::{AppJson, AppPath, AppQuery};
use crate::error::{validation_error, ApiResult};
use crate::models::{NamingVariant, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolvedName {
    pub value: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchResolveRequest {
    #[validate(length(max = 1000, message = "at most 1000 canonicalKeys per batch"))]
    pub canonical_keys: Vec<String>,
    #[validate(length(min = 1, max = 64, message = "context is required"))]
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResolveResponse {
    pub results: HashMap<String, String>,
}

/// Context-specific spelling of one key
pub async fn resolve_name(
    State(state): State<SharedState>,
    AppPath(canonical_key): AppPath<String>,
    AppQuery(query): AppQuery<ContextQuery>,
) -> ApiResult<Json<ResolvedName>> {
    let context = query
        .context
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| validation_error("context is required"))?;

    let value = state
        .facade
        .naming()
        .resolve_for_context(&canonical_key, &context)
        .await?;
    Ok(Json(ResolvedName { value }))
}

/// Context-specific spellings of many keys in one call
pub async fn batch_resolve(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<BatchResolveRequest>,
) -> ApiResult<Json<BatchResolveResponse>> {
    payload.validate()?;
    let results = state
        .facade
        .naming()
        .batch_resolve(&payload.canonical_keys, &payload.context)
        .await?;
    Ok(Json(BatchResolveResponse { results }))
}

/// Create or replace a naming variant
pub async fn upsert_variant(
    State(state): State<SharedState>,
    AppJson(payload): AppJson<NamingVariant>,
) -> ApiResult<Json<SuccessResponse<NamingVariant>>> {
    let variant = state.facade.naming().upsert_variant(payload).await?;
    Ok(Json(SuccessResponse::with_data("Naming variant saved.", variant)))
}
