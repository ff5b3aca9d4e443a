//! Database schema bootstrap
//!
//! Idempotent DDL executed at startup. The uniqueness rules the engine relies on
//! live here as indexes, not in application code.

use crate::error::AppError;
use deadpool_postgres::Pool;
use tracing::info;

/// Tables, in dependency order
const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS standard_packs (
        id UUID PRIMARY KEY,
        code VARCHAR(64) NOT NULL,
        name VARCHAR(255) NOT NULL,
        domain VARCHAR(16) NOT NULL,
        authority_level VARCHAR(16) NOT NULL,
        version VARCHAR(32) NOT NULL,
        status VARCHAR(16) NOT NULL DEFAULT 'ACTIVE'
    );

    CREATE TABLE IF NOT EXISTS concepts (
        id UUID PRIMARY KEY,
        tenant_id VARCHAR(128) NOT NULL,
        canonical_key VARCHAR(128) NOT NULL,
        label VARCHAR(255) NOT NULL,
        description TEXT,
        domain VARCHAR(16) NOT NULL,
        concept_type VARCHAR(16) NOT NULL,
        governance_tier SMALLINT NOT NULL CHECK (governance_tier BETWEEN 1 AND 4),
        standard_pack_id_primary UUID REFERENCES standard_packs(id),
        standard_ref TEXT,
        is_active BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS concept_aliases (
        id UUID PRIMARY KEY,
        concept_id UUID NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        alias_value VARCHAR(255) NOT NULL,
        alias_type VARCHAR(16) NOT NULL,
        source_system VARCHAR(128),
        language VARCHAR(16),
        is_preferred_for_display BOOLEAN NOT NULL DEFAULT false,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS naming_variants (
        canonical_key VARCHAR(128) NOT NULL,
        context VARCHAR(64) NOT NULL,
        value VARCHAR(255) NOT NULL,
        PRIMARY KEY (canonical_key, context)
    );

    CREATE TABLE IF NOT EXISTS profile_jobs (
        id UUID PRIMARY KEY,
        tenant_id VARCHAR(128) NOT NULL,
        entity_type VARCHAR(64) NOT NULL,
        entity_id VARCHAR(255) NOT NULL,
        entity_key VARCHAR(255),
        status VARCHAR(16) NOT NULL,
        scheduled_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ,
        last_error TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        triggered_by VARCHAR(128) NOT NULL,
        reason TEXT,
        profile_id UUID,
        correlation_id UUID NOT NULL,
        next_retry_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );

    CREATE TABLE IF NOT EXISTS alias_lookup_audit (
        id UUID PRIMARY KEY,
        tenant_id VARCHAR(128) NOT NULL,
        term TEXT NOT NULL,
        found BOOLEAN NOT NULL,
        concept_id UUID,
        matched_via VARCHAR(16),
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
"#;

/// Uniqueness constraints and lookup indexes
const CREATE_INDEXES: &str = r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_standard_packs_code
        ON standard_packs (lower(code));

    CREATE UNIQUE INDEX IF NOT EXISTS ux_concepts_tenant_key
        ON concepts (tenant_id, lower(canonical_key));

    CREATE UNIQUE INDEX IF NOT EXISTS ux_concept_aliases_value
        ON concept_aliases (concept_id, lower(alias_value));

    CREATE INDEX IF NOT EXISTS idx_concept_aliases_lower_value
        ON concept_aliases (lower(alias_value));

    CREATE UNIQUE INDEX IF NOT EXISTS ux_profile_jobs_active_entity
        ON profile_jobs (tenant_id, entity_type, entity_id)
        WHERE status IN ('pending', 'running');

    CREATE INDEX IF NOT EXISTS idx_profile_jobs_due
        ON profile_jobs (tenant_id, scheduled_at) WHERE status = 'pending';

    CREATE INDEX IF NOT EXISTS idx_profile_jobs_running
        ON profile_jobs (started_at) WHERE status = 'running';

    CREATE INDEX IF NOT EXISTS idx_profile_jobs_retry
        ON profile_jobs (next_retry_at) WHERE status = 'failed' AND next_retry_at IS NOT NULL;

    CREATE INDEX IF NOT EXISTS idx_alias_lookup_audit_tenant
        ON alias_lookup_audit (tenant_id, recorded_at DESC);
"#;

/// Create tables and indexes if they don't exist
pub async fn migrate(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;

    client.batch_execute(CREATE_TABLES).await?;
    client.batch_execute(CREATE_INDEXES).await?;

    info!("✅ Database schema initialized");
    Ok(())
}
