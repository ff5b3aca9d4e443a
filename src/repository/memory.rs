//! In-memory repository implementations
//!
//! Mirrors the PostgreSQL uniqueness rules so services behave identically
//! against either backend. Each write holds the table's lock only for the
//! constraint check plus the insert, which is what the database index does.

use super::{
    AliasRepository, ConceptRepository, InsertOutcome, LookupAuditRepository,
    NamingVariantRepository, ProfileJobRepository, RepoResult, StandardPackRepository,
};
use crate::error::AppError;
use crate::models::{
    Alias, AliasMatch, Concept, ConceptFilter, Domain, JobStatus, JobTransition,
    LookupAuditEntry, NamingVariant, ProfileJob, StandardPack,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory store implementing every repository trait
#[derive(Default)]
pub struct MemoryStore {
    concepts: RwLock<HashMap<Uuid, Concept>>,
    aliases: RwLock<HashMap<Uuid, Alias>>,
    packs: RwLock<HashMap<Uuid, StandardPack>>,
    naming: RwLock<HashMap<(String, String), String>>,
    jobs: RwLock<HashMap<Uuid, ProfileJob>>,
    audit: RwLock<Vec<LookupAuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Unicode case-insensitive equality, matching Postgres `lower(a) = lower(b)`
fn eq_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn alias_order(a: &AliasMatch, b: &AliasMatch) -> std::cmp::Ordering {
    b.alias
        .is_preferred_for_display
        .cmp(&a.alias.is_preferred_for_display)
        .then_with(|| a.concept.canonical_key.cmp(&b.concept.canonical_key))
}

#[async_trait]
impl ConceptRepository for MemoryStore {
    async fn find_by_key(&self, tenant_id: &str, canonical_key: &str) -> RepoResult<Option<Concept>> {
        let concepts = self.concepts.read().await;
        Ok(concepts
            .values()
            .find(|c| c.tenant_id == tenant_id && eq_ci(&c.canonical_key, canonical_key))
            .cloned())
    }

    async fn list(&self, tenant_id: &str, filter: &ConceptFilter) -> RepoResult<Vec<Concept>> {
        let pack_id = match filter.standard_pack_key.as_deref().filter(|k| !k.is_empty()) {
            Some(code) => match StandardPackRepository::find_by_code(self, code).await? {
                Some(pack) => Some(pack.id),
                // Unknown pack code matches nothing
                None => return Ok(Vec::new()),
            },
            None => None,
        };
        let search = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let concepts = self.concepts.read().await;
        let mut result: Vec<Concept> = concepts
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .filter(|c| filter.domain.map_or(true, |d| c.domain == d))
            .filter(|c| pack_id.map_or(true, |id| c.standard_pack_id_primary == Some(id)))
            .filter(|c| filter.tier.map_or(true, |t| c.governance_tier == t))
            .filter(|c| {
                search.as_deref().map_or(true, |q| {
                    contains_ci(&c.canonical_key, q)
                        || contains_ci(&c.label, q)
                        || c.description.as_deref().map_or(false, |d| contains_ci(d, q))
                })
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| a.canonical_key.cmp(&b.canonical_key));
        Ok(result)
    }

    async fn insert_if_absent(&self, concept: Concept) -> RepoResult<InsertOutcome<Concept>> {
        let mut concepts = self.concepts.write().await;
        if let Some(existing) = concepts.values().find(|c| {
            c.tenant_id == concept.tenant_id
                && eq_ci(&c.canonical_key, &concept.canonical_key)
        }) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        concepts.insert(concept.id, concept.clone());
        Ok(InsertOutcome::Inserted(concept))
    }

    async fn update(&self, concept: &Concept) -> RepoResult<Option<Concept>> {
        let mut concepts = self.concepts.write().await;
        match concepts.get_mut(&concept.id) {
            Some(stored) => {
                stored.label = concept.label.clone();
                stored.description = concept.description.clone();
                stored.governance_tier = concept.governance_tier;
                stored.standard_pack_id_primary = concept.standard_pack_id_primary;
                stored.standard_ref = concept.standard_ref.clone();
                stored.is_active = concept.is_active;
                stored.updated_at = concept.updated_at;
                Ok(Some(stored.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AliasRepository for MemoryStore {
    async fn insert_if_absent(&self, alias: Alias) -> RepoResult<InsertOutcome<Alias>> {
        if !self.concepts.read().await.contains_key(&alias.concept_id) {
            return Err(AppError::NotFound(format!("Concept {} not found", alias.concept_id)));
        }
        let mut aliases = self.aliases.write().await;
        if let Some(existing) = aliases.values().find(|a| {
            a.concept_id == alias.concept_id && eq_ci(&a.alias_value, &alias.alias_value)
        }) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        aliases.insert(alias.id, alias.clone());
        Ok(InsertOutcome::Inserted(alias))
    }

    async fn list_for_concept(&self, concept_id: Uuid) -> RepoResult<Vec<Alias>> {
        let aliases = self.aliases.read().await;
        let mut result: Vec<Alias> = aliases
            .values()
            .filter(|a| a.concept_id == concept_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| {
            b.is_preferred_for_display
                .cmp(&a.is_preferred_for_display)
                .then_with(|| a.alias_value.to_lowercase().cmp(&b.alias_value.to_lowercase()))
        });
        Ok(result)
    }

    async fn find_matches(&self, tenant_id: &str, alias_text: &str) -> RepoResult<Vec<AliasMatch>> {
        let concepts = self.concepts.read().await;
        let aliases = self.aliases.read().await;
        let mut result: Vec<AliasMatch> = aliases
            .values()
            .filter(|a| eq_ci(&a.alias_value, alias_text))
            .filter_map(|a| {
                concepts
                    .get(&a.concept_id)
                    .filter(|c| c.tenant_id == tenant_id)
                    .map(|c| AliasMatch {
                        alias: a.clone(),
                        concept: c.clone(),
                    })
            })
            .collect();
        result.sort_by(alias_order);
        Ok(result)
    }

    async fn search(&self, tenant_id: &str, query: &str, limit: usize) -> RepoResult<Vec<AliasMatch>> {
        let needle = query.to_lowercase();
        let concepts = self.concepts.read().await;
        let aliases = self.aliases.read().await;
        let mut result: Vec<AliasMatch> = aliases
            .values()
            .filter_map(|a| {
                concepts
                    .get(&a.concept_id)
                    .filter(|c| c.tenant_id == tenant_id)
                    .filter(|c| {
                        contains_ci(&a.alias_value, &needle)
                            || contains_ci(&c.canonical_key, &needle)
                            || contains_ci(&c.label, &needle)
                    })
                    .map(|c| AliasMatch {
                        alias: a.clone(),
                        concept: c.clone(),
                    })
            })
            .collect();
        result.sort_by(|a, b| {
            a.concept
                .canonical_key
                .cmp(&b.concept.canonical_key)
                .then_with(|| b.alias.is_preferred_for_display.cmp(&a.alias.is_preferred_for_display))
                .then_with(|| a.alias.alias_value.to_lowercase().cmp(&b.alias.alias_value.to_lowercase()))
        });
        result.truncate(limit);
        Ok(result)
    }
}

#[async_trait]
impl StandardPackRepository for MemoryStore {
    async fn list(&self, domain: Option<Domain>) -> RepoResult<Vec<StandardPack>> {
        let packs = self.packs.read().await;
        let mut result: Vec<StandardPack> = packs
            .values()
            .filter(|p| domain.map_or(true, |d| p.domain == d))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(result)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<StandardPack>> {
        Ok(self.packs.read().await.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> RepoResult<Option<StandardPack>> {
        let packs = self.packs.read().await;
        Ok(packs.values().find(|p| eq_ci(&p.code, code)).cloned())
    }

    async fn insert_if_absent(&self, pack: StandardPack) -> RepoResult<InsertOutcome<StandardPack>> {
        let mut packs = self.packs.write().await;
        if let Some(existing) = packs.values().find(|p| eq_ci(&p.code, &pack.code)) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        packs.insert(pack.id, pack.clone());
        Ok(InsertOutcome::Inserted(pack))
    }
}

#[async_trait]
impl NamingVariantRepository for MemoryStore {
    async fn find_many(&self, keys: &[String], context: &str) -> RepoResult<HashMap<String, String>> {
        let naming = self.naming.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| {
                naming
                    .get(&(k.clone(), context.to_string()))
                    .map(|v| (k.clone(), v.clone()))
            })
            .collect())
    }

    async fn upsert(&self, variant: NamingVariant) -> RepoResult<()> {
        let mut naming = self.naming.write().await;
        naming.insert((variant.canonical_key, variant.context), variant.value);
        Ok(())
    }
}

#[async_trait]
impl ProfileJobRepository for MemoryStore {
    async fn insert_pending(&self, job: ProfileJob) -> RepoResult<ProfileJob> {
        let mut jobs = self.jobs.write().await;
        let occupied = jobs.values().any(|j| {
            j.status.is_active()
                && j.tenant_id == job.tenant_id
                && j.entity_type == job.entity_type
                && j.entity_id == job.entity_id
        });
        if occupied {
            return Err(AppError::Conflict(format!(
                "Entity {}:{} already has an active profile job",
                job.entity_type, job.entity_id
            )));
        }
        let mut job = job;
        job.status = JobStatus::Pending;
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<ProfileJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        change: JobTransition,
    ) -> RepoResult<Option<ProfileJob>> {
        let mut jobs = self.jobs.write().await;
        let job = match jobs.get_mut(&id) {
            Some(job) if job.status == from => job,
            _ => return Ok(None),
        };
        if let Some(due_by) = change.due_by {
            if job.scheduled_at > due_by {
                return Ok(None);
            }
        }

        job.status = to;
        if change.started_at.is_some() {
            job.started_at = change.started_at;
        }
        if change.finished_at.is_some() {
            job.finished_at = change.finished_at;
        }
        if change.last_error.is_some() {
            job.last_error = change.last_error;
        }
        if change.profile_id.is_some() {
            job.profile_id = change.profile_id;
        }
        if change.increment_retry {
            job.retry_count += 1;
        }
        job.next_retry_at = change.next_retry_at;
        Ok(Some(job.clone()))
    }

    async fn list_for_entity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> RepoResult<Vec<ProfileJob>> {
        let jobs = self.jobs.read().await;
        let mut result: Vec<ProfileJob> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && j.entity_type == entity_type && j.entity_id == entity_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn list_due(&self, tenant_id: &str, now: DateTime<Utc>, limit: usize) -> RepoResult<Vec<ProfileJob>> {
        let jobs = self.jobs.read().await;
        let mut result: Vec<ProfileJob> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && j.status == JobStatus::Pending && j.scheduled_at <= now)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_running_started_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> RepoResult<Vec<ProfileJob>> {
        let jobs = self.jobs.read().await;
        let mut result: Vec<ProfileJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && j.started_at.map_or(false, |t| t < cutoff))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_retry_due(&self, now: DateTime<Utc>, limit: usize) -> RepoResult<Vec<ProfileJob>> {
        let jobs = self.jobs.read().await;
        let mut result: Vec<ProfileJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Failed && j.next_retry_at.map_or(false, |t| t <= now))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.next_retry_at.cmp(&b.next_retry_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn clear_retry_marker(&self, id: Uuid) -> RepoResult<()> {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.next_retry_at = None;
        }
        Ok(())
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(j.status.is_terminal()
                && j.next_retry_at.is_none()
                && j.finished_at.map_or(false, |f| f < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }
}

#[async_trait]
impl LookupAuditRepository for MemoryStore {
    async fn record(&self, entry: LookupAuditEntry) -> RepoResult<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }

    async fn recent(&self, tenant_id: &str, limit: usize) -> RepoResult<Vec<LookupAuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit
            .iter()
            .rev() // Most recent first
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AliasType, ConceptType, EntityRef, NewAlias, NewConcept, ScheduleRequest};

    fn entity() -> EntityRef {
        EntityRef {
            entity_type: "table".to_string(),
            entity_id: "public.orders".to_string(),
            entity_key: None,
        }
    }

    #[tokio::test]
    async fn test_active_slot_is_unique_per_entity() {
        let store = MemoryStore::new();
        let request = ScheduleRequest {
            triggered_by: "test".to_string(),
            ..Default::default()
        };

        let first = ProfileJob::pending("t1", &entity(), &request);
        store.insert_pending(first.clone()).await.unwrap();

        let second = ProfileJob::pending("t1", &entity(), &request);
        let err = store.insert_pending(second).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Other tenants have their own slot
        let other = ProfileJob::pending("t2", &entity(), &request);
        assert!(store.insert_pending(other).await.is_ok());
    }

    #[tokio::test]
    async fn test_transition_requires_expected_state() {
        let store = MemoryStore::new();
        let request = ScheduleRequest {
            triggered_by: "test".to_string(),
            ..Default::default()
        };
        let job = store
            .insert_pending(ProfileJob::pending("t1", &entity(), &request))
            .await
            .unwrap();

        let wrong = store
            .transition(job.id, JobStatus::Running, JobStatus::Completed, JobTransition::default())
            .await
            .unwrap();
        assert!(wrong.is_none());

        let started = store
            .transition(job.id, JobStatus::Pending, JobStatus::Running, JobTransition::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(started.status, JobStatus::Running);
    }

    fn concept(tenant_id: &str, key: &str) -> Concept {
        Concept::from_new(
            tenant_id,
            NewConcept {
                canonical_key: key.to_string(),
                label: key.to_string(),
                description: None,
                domain: Domain::Finance,
                concept_type: ConceptType::Field,
                governance_tier: 3,
                standard_pack_id_primary: None,
                standard_ref: None,
                is_active: true,
            },
        )
    }

    fn alias(concept_id: Uuid, value: &str) -> Alias {
        Alias::from_new(
            concept_id,
            NewAlias {
                alias_value: value.to_string(),
                alias_type: AliasType::Lexical,
                source_system: None,
                language: Some("de".to_string()),
                is_preferred_for_display: false,
                notes: None,
            },
        )
    }

    #[tokio::test]
    async fn test_alias_uniqueness_folds_non_ascii_case() {
        let store = MemoryStore::new();
        let revenue = ConceptRepository::insert_if_absent(&store, concept("t1", "revenue"))
            .await
            .unwrap()
            .into_inner();

        let first = AliasRepository::insert_if_absent(&store, alias(revenue.id, "Ümsatz"))
            .await
            .unwrap();
        assert!(first.was_inserted());

        let second = AliasRepository::insert_if_absent(&store, alias(revenue.id, "ümsatz"))
            .await
            .unwrap();
        assert!(!second.was_inserted());
        assert_eq!(second.into_inner().alias_value, "Ümsatz");

        let matches = store.find_matches("t1", "ÜMSATZ").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].concept.canonical_key, "revenue");
    }

    #[tokio::test]
    async fn test_concept_key_lookup_folds_non_ascii_case() {
        let store = MemoryStore::new();
        ConceptRepository::insert_if_absent(&store, concept("t1", "größe"))
            .await
            .unwrap();

        let again = ConceptRepository::insert_if_absent(&store, concept("t1", "GRÖßE"))
            .await
            .unwrap();
        assert!(!again.was_inserted());

        let found = store.find_by_key("t1", "GRÖßE").await.unwrap();
        assert_eq!(found.map(|c| c.canonical_key), Some("größe".to_string()));
    }
}
