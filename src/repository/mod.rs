//! Storage capability boundary
//!
//! One repository trait per entity. `PgStore` is the production backend,
//! `MemoryStore` is a faithful in-process fake used by tests. Both enforce the
//! same uniqueness rules; services coordinate writes only through those rules.

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod schema;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppError;
use crate::models::{
    Alias, AliasMatch, Concept, ConceptFilter, Domain, JobStatus, JobTransition,
    LookupAuditEntry, NamingVariant, ProfileJob, StandardPack,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, AppError>;

/// Result of an idempotent insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted(T),
    /// A row with the same natural key already existed and was left untouched
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Inserted(v) | InsertOutcome::Existing(v) => v,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

#[async_trait]
pub trait ConceptRepository: Send + Sync {
    /// Case-insensitive lookup on the canonical key
    async fn find_by_key(&self, tenant_id: &str, canonical_key: &str) -> RepoResult<Option<Concept>>;

    /// Filtered listing, ordered by canonical key
    async fn list(&self, tenant_id: &str, filter: &ConceptFilter) -> RepoResult<Vec<Concept>>;

    /// Insert unless `(tenant_id, lower(canonical_key))` is taken
    async fn insert_if_absent(&self, concept: Concept) -> RepoResult<InsertOutcome<Concept>>;

    /// Overwrite the mutable columns of an existing row
    async fn update(&self, concept: &Concept) -> RepoResult<Option<Concept>>;
}

#[async_trait]
pub trait AliasRepository: Send + Sync {
    /// Insert unless `(concept_id, lower(alias_value))` is taken
    async fn insert_if_absent(&self, alias: Alias) -> RepoResult<InsertOutcome<Alias>>;

    async fn list_for_concept(&self, concept_id: Uuid) -> RepoResult<Vec<Alias>>;

    /// Every alias of the tenant's concepts whose value equals `alias_text`, ignoring case
    async fn find_matches(&self, tenant_id: &str, alias_text: &str) -> RepoResult<Vec<AliasMatch>>;

    /// Substring search over alias value, concept key and concept label
    async fn search(&self, tenant_id: &str, query: &str, limit: usize) -> RepoResult<Vec<AliasMatch>>;
}

#[async_trait]
pub trait StandardPackRepository: Send + Sync {
    async fn list(&self, domain: Option<Domain>) -> RepoResult<Vec<StandardPack>>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<StandardPack>>;

    async fn find_by_code(&self, code: &str) -> RepoResult<Option<StandardPack>>;

    async fn insert_if_absent(&self, pack: StandardPack) -> RepoResult<InsertOutcome<StandardPack>>;
}

#[async_trait]
pub trait NamingVariantRepository: Send + Sync {
    /// Stored variants for `keys` in `context`, in a single round trip.
    /// Keys without a variant are simply absent from the map.
    async fn find_many(&self, keys: &[String], context: &str) -> RepoResult<HashMap<String, String>>;

    async fn upsert(&self, variant: NamingVariant) -> RepoResult<()>;
}

#[async_trait]
pub trait ProfileJobRepository: Send + Sync {
    /// Insert a pending row. Fails with `AppError::Conflict` when the entity
    /// already has a pending or running job.
    async fn insert_pending(&self, job: ProfileJob) -> RepoResult<ProfileJob>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<ProfileJob>>;

    /// Conditional state change. Returns `None` when the row is missing, is not
    /// in `from`, or (for claims) is not yet due.
    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        change: JobTransition,
    ) -> RepoResult<Option<ProfileJob>>;

    /// Jobs for one entity, newest first
    async fn list_for_entity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> RepoResult<Vec<ProfileJob>>;

    /// A tenant's pending jobs whose `scheduled_at` has passed, oldest first
    async fn list_due(&self, tenant_id: &str, now: DateTime<Utc>, limit: usize) -> RepoResult<Vec<ProfileJob>>;

    /// Running jobs claimed before `cutoff`, oldest claim first
    async fn list_running_started_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> RepoResult<Vec<ProfileJob>>;

    /// Failed jobs whose durable retry marker has passed
    async fn list_retry_due(&self, now: DateTime<Utc>, limit: usize) -> RepoResult<Vec<ProfileJob>>;

    async fn clear_retry_marker(&self, id: Uuid) -> RepoResult<()>;

    /// Remove terminal jobs finished before `cutoff`; returns the number removed
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait LookupAuditRepository: Send + Sync {
    async fn record(&self, entry: LookupAuditEntry) -> RepoResult<()>;

    async fn recent(&self, tenant_id: &str, limit: usize) -> RepoResult<Vec<LookupAuditEntry>>;
}

/// The full set of repositories handed to the services
#[derive(Clone)]
pub struct Repositories {
    pub concepts: Arc<dyn ConceptRepository>,
    pub aliases: Arc<dyn AliasRepository>,
    pub packs: Arc<dyn StandardPackRepository>,
    pub naming: Arc<dyn NamingVariantRepository>,
    pub jobs: Arc<dyn ProfileJobRepository>,
    pub audit: Arc<dyn LookupAuditRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: Pool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    /// Fresh in-memory repositories
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ConceptRepository
            + AliasRepository
            + StandardPackRepository
            + NamingVariantRepository
            + ProfileJobRepository
            + LookupAuditRepository
            + 'static,
    {
        Self {
            concepts: store.clone(),
            aliases: store.clone(),
            packs: store.clone(),
            naming: store.clone(),
            jobs: store.clone(),
            audit: store,
        }
    }
}
