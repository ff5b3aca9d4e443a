//! Concept, alias, standard pack and glossary route handlers

use super::extract::{AppJson, AppPath, AppQuery};
use crate::error::{not_found_error, validation_error, ApiResult};
use crate::models::{
    Alias, AliasMatch, Concept, ConceptFilter, ConceptPatch, Domain, LookupAuditEntry, NewAlias,
    NewConcept, Resolution, StandardPack, SuccessResponse,
};
use crate::repository::InsertOutcome;
use crate::state::SharedState;
use crate::tenant::TenantContext;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ConceptQuery {
    pub domain: Option<String>,
    pub standard_pack_key: Option<String>,
    pub tier: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AliasResolveQuery {
    pub alias_text: Option<String>,
    pub context_domain: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TermQuery {
    pub term: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GlossaryQuery {
    pub q: Option<String>,
}

/// Parse an optional domain query value; blank means no filter
fn parse_domain(raw: Option<&str>) -> ApiResult<Option<Domain>> {
    match raw.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => Ok(Some(d.parse()?)),
        None => Ok(None),
    }
}

/// Parse an optional tier query value; blank means no filter
fn parse_tier(raw: Option<&str>) -> ApiResult<Option<i16>> {
    match raw.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t
            .parse()
            .map(Some)
            .map_err(|_| validation_error(format!("tier must be a number, got '{}'", t))),
        None => Ok(None),
    }
}

/// 201 for a fresh row, 200 when the natural key already existed
fn insert_response<T: serde::Serialize>(
    outcome: InsertOutcome<T>,
    created: &str,
    existing: &str,
) -> (StatusCode, Json<SuccessResponse<T>>) {
    let (status, message) = if outcome.was_inserted() {
        (StatusCode::CREATED, created)
    } else {
        (StatusCode::OK, existing)
    };
    (status, Json(SuccessResponse::with_data(message, outcome.into_inner())))
}

/// Get a concept by canonical key (case-insensitive)
pub async fn get_concept(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(canonical_key): AppPath<String>,
) -> ApiResult<Json<Concept>> {
    state
        .facade
        .concepts()
        .get_by_canonical_key(&tenant.tenant_id, &canonical_key)
        .await?
        .map(Json)
        .ok_or_else(|| not_found_error(format!("Concept '{}' not found", canonical_key)))
}

/// List concepts with optional filters
pub async fn list_concepts(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<ConceptQuery>,
) -> ApiResult<Json<Vec<Concept>>> {
    let filter = ConceptFilter {
        domain: parse_domain(query.domain.as_deref())?,
        standard_pack_key: query.standard_pack_key,
        tier: parse_tier(query.tier.as_deref())?,
        search: query.search,
    };
    debug!("Listing concepts for tenant {} with {:?}", tenant.tenant_id, filter);

    let concepts = state.facade.concepts().list(&tenant.tenant_id, &filter).await?;
    Ok(Json(concepts))
}

/// Register a concept behind the governance gate
pub async fn create_concept(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppJson(payload): AppJson<NewConcept>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Concept>>)> {
    let outcome = state.facade.concepts().create(&tenant.tenant_id, payload).await?;
    Ok(insert_response(
        outcome,
        "Concept created successfully.",
        "Concept already exists.",
    ))
}

/// Partially update a concept
pub async fn update_concept(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(canonical_key): AppPath<String>,
    AppJson(patch): AppJson<ConceptPatch>,
) -> ApiResult<Json<SuccessResponse<Concept>>> {
    let concept = state
        .facade
        .concepts()
        .update(&tenant.tenant_id, &canonical_key, patch)
        .await?;
    Ok(Json(SuccessResponse::with_data("Concept updated successfully.", concept)))
}

/// All candidate concepts for an alias text
pub async fn resolve_aliases(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<AliasResolveQuery>,
) -> ApiResult<Json<Vec<AliasMatch>>> {
    let alias_text = query
        .alias_text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| validation_error("alias_text is required"))?;
    let context_domain = parse_domain(query.context_domain.as_deref())?;

    let matches = state
        .facade
        .aliases()
        .resolve_alias(&tenant.tenant_id, &alias_text, context_domain, query.language.as_deref())
        .await?;
    Ok(Json(matches))
}

/// Aliases attached to one concept
pub async fn list_concept_aliases(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(canonical_key): AppPath<String>,
) -> ApiResult<Json<Vec<Alias>>> {
    state
        .facade
        .concepts()
        .list_aliases(&tenant.tenant_id, &canonical_key)
        .await?
        .map(Json)
        .ok_or_else(|| not_found_error(format!("Concept '{}' not found", canonical_key)))
}

/// Attach an alias to a concept
pub async fn add_alias(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(canonical_key): AppPath<String>,
    AppJson(payload): AppJson<NewAlias>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Alias>>)> {
    let outcome = state
        .facade
        .concepts()
        .add_alias(&tenant.tenant_id, &canonical_key, payload)
        .await?;
    Ok(insert_response(
        outcome,
        "Alias added successfully.",
        "Alias already exists.",
    ))
}

/// Resolve a free-text term to one concept
pub async fn resolve_term(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<TermQuery>,
) -> ApiResult<Json<Resolution>> {
    let term = query
        .term
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| validation_error("term is required"))?;

    state
        .facade
        .aliases()
        .resolve(&term, &tenant.tenant_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found_error(format!("No concept matches '{}'", term.trim())))
}

/// The tenant's most recent term lookups, newest first
pub async fn lookup_audit(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<LimitQuery>,
) -> ApiResult<Json<Vec<LookupAuditEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT);
    let entries = state
        .facade
        .aliases()
        .recent_lookups(&tenant.tenant_id, limit)
        .await?;
    Ok(Json(entries))
}

/// Standard packs, optionally for one domain
pub async fn list_standard_packs(
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<DomainQuery>,
) -> ApiResult<Json<Vec<StandardPack>>> {
    let domain = parse_domain(query.domain.as_deref())?;
    let packs = state.facade.packs().list(domain).await?;
    Ok(Json(packs))
}

/// One standard pack by code (case-insensitive)
pub async fn get_standard_pack(
    State(state): State<SharedState>,
    AppPath(code): AppPath<String>,
) -> ApiResult<Json<StandardPack>> {
    state
        .facade
        .packs()
        .get_by_code(&code)
        .await?
        .map(Json)
        .ok_or_else(|| not_found_error(format!("Standard pack '{}' not found", code)))
}

/// Substring search across aliases and concepts
pub async fn search_glossary(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppQuery(query): AppQuery<GlossaryQuery>,
) -> ApiResult<Json<Vec<AliasMatch>>> {
    let q = query.q.unwrap_or_default();
    let hits = state
        .facade
        .aliases()
        .search_glossary(&tenant.tenant_id, &q)
        .await?;
    Ok(Json(hits))
}
