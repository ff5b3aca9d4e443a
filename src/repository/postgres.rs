//! PostgreSQL repository implementations
//!
//! All repositories share one deadpool pool. Uniqueness is delegated to the
//! indexes created in [`super::schema`]; a unique violation surfaces as
//! `AppError::Conflict`.

use super::{
    AliasRepository, ConceptRepository, InsertOutcome, LookupAuditRepository,
    NamingVariantRepository, ProfileJobRepository, RepoResult, StandardPackRepository,
};
use crate::error::AppError;
use crate::models::{
    Alias, AliasMatch, Concept, ConceptFilter, Domain, JobStatus, JobTransition,
    LookupAuditEntry, MatchPath, NamingVariant, ProfileJob, StandardPack,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use postgres_types::ToSql;
use std::collections::HashMap;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

const CONCEPT_COLUMNS: &str = r#"
    c.id, c.tenant_id, c.canonical_key, c.label, c.description, c.domain,
    c.concept_type, c.governance_tier, c.standard_pack_id_primary, c.standard_ref,
    c.is_active, c.created_at, c.updated_at
"#;

const ALIAS_COLUMNS: &str = r#"
    a.id AS alias_id, a.concept_id AS alias_concept_id, a.alias_value, a.alias_type,
    a.source_system, a.language AS alias_language, a.is_preferred_for_display,
    a.notes AS alias_notes, a.created_at AS alias_created_at
"#;

const PACK_COLUMNS: &str = "id, code, name, domain, authority_level, version, status";

const JOB_COLUMNS: &str = r#"
    id, tenant_id, entity_type, entity_id, entity_key, status, scheduled_at,
    started_at, finished_at, last_error, retry_count, triggered_by, reason,
    profile_id, correlation_id, next_retry_at, created_at
"#;

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL-backed store implementing every repository trait
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> RepoResult<Object> {
        Ok(self.pool.get().await?)
    }
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn param_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn concept_from_row(row: &Row) -> RepoResult<Concept> {
    Ok(Concept {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        canonical_key: row.get("canonical_key"),
        label: row.get("label"),
        description: row.get("description"),
        domain: row.get::<_, String>("domain").parse()?,
        concept_type: row.get::<_, String>("concept_type").parse()?,
        governance_tier: row.get("governance_tier"),
        standard_pack_id_primary: row.get("standard_pack_id_primary"),
        standard_ref: row.get("standard_ref"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn alias_from_row(row: &Row) -> RepoResult<Alias> {
    Ok(Alias {
        id: row.get("alias_id"),
        concept_id: row.get("alias_concept_id"),
        alias_value: row.get("alias_value"),
        alias_type: row.get::<_, String>("alias_type").parse()?,
        source_system: row.get("source_system"),
        language: row.get("alias_language"),
        is_preferred_for_display: row.get("is_preferred_for_display"),
        notes: row.get("alias_notes"),
        created_at: row.get("alias_created_at"),
    })
}

fn alias_match_from_row(row: &Row) -> RepoResult<AliasMatch> {
    Ok(AliasMatch {
        alias: alias_from_row(row)?,
        concept: concept_from_row(row)?,
    })
}

fn pack_from_row(row: &Row) -> RepoResult<StandardPack> {
    Ok(StandardPack {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        domain: row.get::<_, String>("domain").parse()?,
        authority_level: row.get::<_, String>("authority_level").parse()?,
        version: row.get("version"),
        status: row.get::<_, String>("status").parse()?,
    })
}

fn job_from_row(row: &Row) -> RepoResult<ProfileJob> {
    Ok(ProfileJob {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        entity_key: row.get("entity_key"),
        status: row.get::<_, String>("status").parse()?,
        scheduled_at: row.get("scheduled_at"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
        last_error: row.get("last_error"),
        retry_count: row.get("retry_count"),
        triggered_by: row.get("triggered_by"),
        reason: row.get("reason"),
        profile_id: row.get("profile_id"),
        correlation_id: row.get("correlation_id"),
        next_retry_at: row.get("next_retry_at"),
        created_at: row.get("created_at"),
    })
}

fn audit_from_row(row: &Row) -> RepoResult<LookupAuditEntry> {
    let matched_via = row
        .get::<_, Option<String>>("matched_via")
        .map(|m| m.parse::<MatchPath>())
        .transpose()?;
    Ok(LookupAuditEntry {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        term: row.get("term"),
        found: row.get("found"),
        concept_id: row.get("concept_id"),
        matched_via,
        recorded_at: row.get("recorded_at"),
    })
}

#[async_trait]
impl ConceptRepository for PgStore {
    async fn find_by_key(&self, tenant_id: &str, canonical_key: &str) -> RepoResult<Option<Concept>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM concepts c WHERE c.tenant_id = $1 AND lower(c.canonical_key) = lower($2)",
            CONCEPT_COLUMNS
        );
        let row = client.query_opt(&sql, &[&tenant_id, &canonical_key]).await?;
        row.as_ref().map(concept_from_row).transpose()
    }

    async fn list(&self, tenant_id: &str, filter: &ConceptFilter) -> RepoResult<Vec<Concept>> {
        let client = self.client().await?;

        let mut params: Vec<SqlParam> = vec![Box::new(tenant_id.to_string())];
        let mut conditions = vec!["c.tenant_id = $1".to_string()];

        if let Some(domain) = filter.domain {
            params.push(Box::new(domain.as_str().to_string()));
            conditions.push(format!("c.domain = ${}", params.len()));
        }
        if let Some(pack_key) = filter.standard_pack_key.as_deref().filter(|k| !k.is_empty()) {
            params.push(Box::new(pack_key.to_string()));
            conditions.push(format!("lower(p.code) = lower(${})", params.len()));
        }
        if let Some(tier) = filter.tier {
            params.push(Box::new(tier));
            conditions.push(format!("c.governance_tier = ${}", params.len()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(Box::new(like_pattern(search)));
            let n = params.len();
            conditions.push(format!(
                "(c.canonical_key ILIKE ${n} OR c.label ILIKE ${n} OR COALESCE(c.description, '') ILIKE ${n})"
            ));
        }

        let sql = format!(
            "SELECT {} FROM concepts c
             LEFT JOIN standard_packs p ON p.id = c.standard_pack_id_primary
             WHERE {}
             ORDER BY c.canonical_key",
            CONCEPT_COLUMNS,
            conditions.join(" AND ")
        );

        let rows = client.query(&sql, &param_refs(&params)).await?;
        rows.iter().map(concept_from_row).collect()
    }

    async fn insert_if_absent(&self, concept: Concept) -> RepoResult<InsertOutcome<Concept>> {
        let client = self.client().await?;
        let inserted = client
            .execute(
                "INSERT INTO concepts (id, tenant_id, canonical_key, label, description, domain,
                    concept_type, governance_tier, standard_pack_id_primary, standard_ref,
                    is_active, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 ON CONFLICT (tenant_id, lower(canonical_key)) DO NOTHING",
                &[
                    &concept.id,
                    &concept.tenant_id,
                    &concept.canonical_key,
                    &concept.label,
                    &concept.description,
                    &concept.domain.as_str(),
                    &concept.concept_type.as_str(),
                    &concept.governance_tier,
                    &concept.standard_pack_id_primary,
                    &concept.standard_ref,
                    &concept.is_active,
                    &concept.created_at,
                    &concept.updated_at,
                ],
            )
            .await?;
        drop(client);

        if inserted == 1 {
            return Ok(InsertOutcome::Inserted(concept));
        }

        debug!(
            tenant_id = %concept.tenant_id,
            canonical_key = %concept.canonical_key,
            "concept already present, insert skipped"
        );
        self.find_by_key(&concept.tenant_id, &concept.canonical_key)
            .await?
            .map(InsertOutcome::Existing)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Concept '{}' conflicted on insert but could not be read back",
                    concept.canonical_key
                ))
            })
    }

    async fn update(&self, concept: &Concept) -> RepoResult<Option<Concept>> {
        let client = self.client().await?;
        let sql = format!(
            "UPDATE concepts c SET label = $2, description = $3, governance_tier = $4,
                standard_pack_id_primary = $5, standard_ref = $6, is_active = $7, updated_at = $8
             WHERE c.id = $1
             RETURNING {}",
            CONCEPT_COLUMNS
        );
        let row = client
            .query_opt(
                &sql,
                &[
                    &concept.id,
                    &concept.label,
                    &concept.description,
                    &concept.governance_tier,
                    &concept.standard_pack_id_primary,
                    &concept.standard_ref,
                    &concept.is_active,
                    &concept.updated_at,
                ],
            )
            .await?;
        row.as_ref().map(concept_from_row).transpose()
    }
}

#[async_trait]
impl AliasRepository for PgStore {
    async fn insert_if_absent(&self, alias: Alias) -> RepoResult<InsertOutcome<Alias>> {
        let client = self.client().await?;
        let inserted = client
            .execute(
                "INSERT INTO concept_aliases (id, concept_id, alias_value, alias_type, source_system,
                    language, is_preferred_for_display, notes, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (concept_id, lower(alias_value)) DO NOTHING",
                &[
                    &alias.id,
                    &alias.concept_id,
                    &alias.alias_value,
                    &alias.alias_type.as_str(),
                    &alias.source_system,
                    &alias.language,
                    &alias.is_preferred_for_display,
                    &alias.notes,
                    &alias.created_at,
                ],
            )
            .await?;

        if inserted == 1 {
            return Ok(InsertOutcome::Inserted(alias));
        }

        let sql = format!(
            "SELECT {} FROM concept_aliases a
             WHERE a.concept_id = $1 AND lower(a.alias_value) = lower($2)",
            ALIAS_COLUMNS
        );
        let row = client
            .query_one(&sql, &[&alias.concept_id, &alias.alias_value])
            .await?;
        Ok(InsertOutcome::Existing(alias_from_row(&row)?))
    }

    async fn list_for_concept(&self, concept_id: Uuid) -> RepoResult<Vec<Alias>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM concept_aliases a
             WHERE a.concept_id = $1
             ORDER BY a.is_preferred_for_display DESC, lower(a.alias_value)",
            ALIAS_COLUMNS
        );
        let rows = client.query(&sql, &[&concept_id]).await?;
        rows.iter().map(alias_from_row).collect()
    }

    async fn find_matches(&self, tenant_id: &str, alias_text: &str) -> RepoResult<Vec<AliasMatch>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {}, {} FROM concept_aliases a
             JOIN concepts c ON c.id = a.concept_id
             WHERE c.tenant_id = $1 AND lower(a.alias_value) = lower($2)
             ORDER BY a.is_preferred_for_display DESC, c.canonical_key",
            ALIAS_COLUMNS, CONCEPT_COLUMNS
        );
        let rows = client.query(&sql, &[&tenant_id, &alias_text]).await?;
        rows.iter().map(alias_match_from_row).collect()
    }

    async fn search(&self, tenant_id: &str, query: &str, limit: usize) -> RepoResult<Vec<AliasMatch>> {
        let client = self.client().await?;
        let pattern = like_pattern(query);
        let limit = limit as i64;
        let sql = format!(
            "SELECT {}, {} FROM concept_aliases a
             JOIN concepts c ON c.id = a.concept_id
             WHERE c.tenant_id = $1
               AND (a.alias_value ILIKE $2 OR c.canonical_key ILIKE $2 OR c.label ILIKE $2)
             ORDER BY c.canonical_key, a.is_preferred_for_display DESC, lower(a.alias_value)
             LIMIT $3",
            ALIAS_COLUMNS, CONCEPT_COLUMNS
        );
        let rows = client.query(&sql, &[&tenant_id, &pattern, &limit]).await?;
        rows.iter().map(alias_match_from_row).collect()
    }
}

#[async_trait]
impl StandardPackRepository for PgStore {
    async fn list(&self, domain: Option<Domain>) -> RepoResult<Vec<StandardPack>> {
        let client = self.client().await?;
        let domain = domain.map(|d| d.as_str().to_string());
        let sql = format!(
            "SELECT {} FROM standard_packs
             WHERE ($1::VARCHAR IS NULL OR domain = $1)
             ORDER BY code",
            PACK_COLUMNS
        );
        let rows = client.query(&sql, &[&domain]).await?;
        rows.iter().map(pack_from_row).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<StandardPack>> {
        let client = self.client().await?;
        let sql = format!("SELECT {} FROM standard_packs WHERE id = $1", PACK_COLUMNS);
        let row = client.query_opt(&sql, &[&id]).await?;
        row.as_ref().map(pack_from_row).transpose()
    }

    async fn find_by_code(&self, code: &str) -> RepoResult<Option<StandardPack>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM standard_packs WHERE lower(code) = lower($1)",
            PACK_COLUMNS
        );
        let row = client.query_opt(&sql, &[&code]).await?;
        row.as_ref().map(pack_from_row).transpose()
    }

    async fn insert_if_absent(&self, pack: StandardPack) -> RepoResult<InsertOutcome<StandardPack>> {
        let client = self.client().await?;
        let inserted = client
            .execute(
                "INSERT INTO standard_packs (id, code, name, domain, authority_level, version, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (lower(code)) DO NOTHING",
                &[
                    &pack.id,
                    &pack.code,
                    &pack.name,
                    &pack.domain.as_str(),
                    &pack.authority_level.as_str(),
                    &pack.version,
                    &pack.status.as_str(),
                ],
            )
            .await?;
        drop(client);

        if inserted == 1 {
            return Ok(InsertOutcome::Inserted(pack));
        }
        self.find_by_code(&pack.code)
            .await?
            .map(InsertOutcome::Existing)
            .ok_or_else(|| AppError::Internal(format!("Standard pack '{}' vanished", pack.code)))
    }
}

#[async_trait]
impl NamingVariantRepository for PgStore {
    async fn find_many(&self, keys: &[String], context: &str) -> RepoResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let client = self.client().await?;
        let keys = keys.to_vec();
        let rows = client
            .query(
                "SELECT canonical_key, value FROM naming_variants
                 WHERE context = $1 AND canonical_key = ANY($2)",
                &[&context, &keys],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<_, String>("canonical_key"), r.get::<_, String>("value")))
            .collect())
    }

    async fn upsert(&self, variant: NamingVariant) -> RepoResult<()> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO naming_variants (canonical_key, context, value)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (canonical_key, context) DO UPDATE SET value = EXCLUDED.value",
                &[&variant.canonical_key, &variant.context, &variant.value],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileJobRepository for PgStore {
    async fn insert_pending(&self, job: ProfileJob) -> RepoResult<ProfileJob> {
        let client = self.client().await?;
        let result = client
            .execute(
                "INSERT INTO profile_jobs (id, tenant_id, entity_type, entity_id, entity_key, status,
                    scheduled_at, retry_count, triggered_by, reason, correlation_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                &[
                    &job.id,
                    &job.tenant_id,
                    &job.entity_type,
                    &job.entity_id,
                    &job.entity_key,
                    &JobStatus::Pending.as_str(),
                    &job.scheduled_at,
                    &job.retry_count,
                    &job.triggered_by,
                    &job.reason,
                    &job.correlation_id,
                    &job.created_at,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(job),
            Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(format!(
                "Entity {}:{} already has an active profile job",
                job.entity_type, job.entity_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<ProfileJob>> {
        let client = self.client().await?;
        let sql = format!("SELECT {} FROM profile_jobs WHERE id = $1", JOB_COLUMNS);
        let row = client.query_opt(&sql, &[&id]).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        change: JobTransition,
    ) -> RepoResult<Option<ProfileJob>> {
        let client = self.client().await?;
        let increment: i32 = if change.increment_retry { 1 } else { 0 };
        let sql = format!(
            "UPDATE profile_jobs SET
                status = $3,
                started_at = COALESCE($4, started_at),
                finished_at = COALESCE($5, finished_at),
                last_error = COALESCE($6, last_error),
                profile_id = COALESCE($7, profile_id),
                retry_count = retry_count + $8,
                next_retry_at = $9
             WHERE id = $1 AND status = $2
               AND ($10::TIMESTAMPTZ IS NULL OR scheduled_at <= $10)
             RETURNING {}",
            JOB_COLUMNS
        );
        let row = client
            .query_opt(
                &sql,
                &[
                    &id,
                    &from.as_str(),
                    &to.as_str(),
                    &change.started_at,
                    &change.finished_at,
                    &change.last_error,
                    &change.profile_id,
                    &increment,
                    &change.next_retry_at,
                    &change.due_by,
                ],
            )
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_for_entity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> RepoResult<Vec<ProfileJob>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM profile_jobs
             WHERE tenant_id = $1 AND entity_type = $2 AND entity_id = $3
             ORDER BY created_at DESC",
            JOB_COLUMNS
        );
        let rows = client.query(&sql, &[&tenant_id, &entity_type, &entity_id]).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn list_due(&self, tenant_id: &str, now: DateTime<Utc>, limit: usize) -> RepoResult<Vec<ProfileJob>> {
        let client = self.client().await?;
        let limit = limit as i64;
        let sql = format!(
            "SELECT {} FROM profile_jobs
             WHERE tenant_id = $1 AND status = 'pending' AND scheduled_at <= $2
             ORDER BY scheduled_at
             LIMIT $3",
            JOB_COLUMNS
        );
        let rows = client.query(&sql, &[&tenant_id, &now, &limit]).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn list_running_started_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> RepoResult<Vec<ProfileJob>> {
        let client = self.client().await?;
        let limit = limit as i64;
        let sql = format!(
            "SELECT {} FROM profile_jobs
             WHERE status = 'running' AND started_at < $1
             ORDER BY started_at
             LIMIT $2",
            JOB_COLUMNS
        );
        let rows = client.query(&sql, &[&cutoff, &limit]).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn list_retry_due(&self, now: DateTime<Utc>, limit: usize) -> RepoResult<Vec<ProfileJob>> {
        let client = self.client().await?;
        let limit = limit as i64;
        let sql = format!(
            "SELECT {} FROM profile_jobs
             WHERE status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= $1
             ORDER BY next_retry_at
             LIMIT $2",
            JOB_COLUMNS
        );
        let rows = client.query(&sql, &[&now, &limit]).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn clear_retry_marker(&self, id: Uuid) -> RepoResult<()> {
        let client = self.client().await?;
        client
            .execute("UPDATE profile_jobs SET next_retry_at = NULL WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let client = self.client().await?;
        let removed = client
            .execute(
                "DELETE FROM profile_jobs
                 WHERE status IN ('completed', 'failed')
                   AND finished_at < $1
                   AND next_retry_at IS NULL",
                &[&cutoff],
            )
            .await?;
        Ok(removed)
    }
}

#[async_trait]
impl LookupAuditRepository for PgStore {
    async fn record(&self, entry: LookupAuditEntry) -> RepoResult<()> {
        let client = self.client().await?;
        let matched_via = entry.matched_via.map(|m| m.as_str());
        client
            .execute(
                "INSERT INTO alias_lookup_audit (id, tenant_id, term, found, concept_id, matched_via, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &entry.id,
                    &entry.tenant_id,
                    &entry.term,
                    &entry.found,
                    &entry.concept_id,
                    &matched_via,
                    &entry.recorded_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn recent(&self, tenant_id: &str, limit: usize) -> RepoResult<Vec<LookupAuditEntry>> {
        let client = self.client().await?;
        let limit = limit as i64;
        let rows = client
            .query(
                "SELECT id, tenant_id, term, found, concept_id, matched_via, recorded_at
                 FROM alias_lookup_audit
                 WHERE tenant_id = $1
                 ORDER BY recorded_at DESC
                 LIMIT $2",
                &[&tenant_id, &limit],
            )
            .await?;
        rows.iter().map(audit_from_row).collect()
    }
}
