//! Concept store
//!
//! Tenant-scoped reads and governed writes over canonical concepts and their aliases.

use super::governance::{GovernanceValidator, ValidationResult};
use super::standard_packs::StandardPackRegistry;
use crate::error::AppError;
use crate::models::{
    Alias, Concept, ConceptFilter, ConceptPatch, Domain, NewAlias, NewConcept,
};
use crate::repository::{AliasRepository, ConceptRepository, InsertOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

pub struct ConceptStore {
    concepts: Arc<dyn ConceptRepository>,
    aliases: Arc<dyn AliasRepository>,
    packs: Arc<StandardPackRegistry>,
    validator: GovernanceValidator,
}

impl ConceptStore {
    pub fn new(
        concepts: Arc<dyn ConceptRepository>,
        aliases: Arc<dyn AliasRepository>,
        packs: Arc<StandardPackRegistry>,
    ) -> Self {
        Self {
            concepts,
            aliases,
            packs,
            validator: GovernanceValidator::new(),
        }
    }

    /// Exact, case-insensitive lookup. Absence is `Ok(None)`.
    pub async fn get_by_canonical_key(
        &self,
        tenant_id: &str,
        canonical_key: &str,
    ) -> Result<Option<Concept>, AppError> {
        let key = canonical_key.trim();
        if key.is_empty() {
            return Ok(None);
        }
        self.concepts.find_by_key(tenant_id, key).await
    }

    pub async fn list(&self, tenant_id: &str, filter: &ConceptFilter) -> Result<Vec<Concept>, AppError> {
        self.concepts.list(tenant_id, filter).await
    }

    /// Resolve the referenced pack and run the governance rules
    pub async fn check_governance(
        &self,
        domain: Domain,
        tier: i16,
        standard_pack_id: Option<Uuid>,
    ) -> Result<ValidationResult, AppError> {
        let pack = match standard_pack_id {
            Some(id) => self.packs.get_by_id(id).await?,
            None => None,
        };
        Ok(self
            .validator
            .validate(domain, tier, standard_pack_id, pack.as_ref()))
    }

    async fn gate(&self, domain: Domain, tier: i16, standard_pack_id: Option<Uuid>) -> Result<(), AppError> {
        let result = self.check_governance(domain, tier, standard_pack_id).await?;
        if result.valid {
            Ok(())
        } else {
            warn!(
                domain = %domain,
                tier,
                violations = ?result.error_messages(),
                "Concept write rejected by governance gate"
            );
            Err(AppError::Governance(result.errors))
        }
    }

    /// Register a concept. Nothing reaches storage unless the governance gate
    /// passes; a duplicate key returns the stored concept untouched.
    pub async fn create(
        &self,
        tenant_id: &str,
        new: NewConcept,
    ) -> Result<InsertOutcome<Concept>, AppError> {
        new.validate()?;
        self.gate(new.domain, new.governance_tier, new.standard_pack_id_primary)
            .await?;

        let outcome = self
            .concepts
            .insert_if_absent(Concept::from_new(tenant_id, new))
            .await?;

        match &outcome {
            InsertOutcome::Inserted(c) => {
                info!(tenant_id, canonical_key = %c.canonical_key, "Concept created")
            }
            InsertOutcome::Existing(c) => {
                debug!(tenant_id, canonical_key = %c.canonical_key, "Concept already registered")
            }
        }
        Ok(outcome)
    }

    /// Apply a partial update. The merged concept passes the same gate as a create.
    pub async fn update(
        &self,
        tenant_id: &str,
        canonical_key: &str,
        patch: ConceptPatch,
    ) -> Result<Concept, AppError> {
        patch.validate()?;
        let existing = self
            .get_by_canonical_key(tenant_id, canonical_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Concept '{}' not found", canonical_key)))?;

        let merged = existing.patched(&patch);
        self.gate(merged.domain, merged.governance_tier, merged.standard_pack_id_primary)
            .await?;

        let updated = self
            .concepts
            .update(&merged)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Concept '{}' not found", canonical_key)))?;
        info!(tenant_id, canonical_key = %updated.canonical_key, "Concept updated");
        Ok(updated)
    }

    /// Attach an alias to one of the tenant's concepts
    pub async fn add_alias(
        &self,
        tenant_id: &str,
        canonical_key: &str,
        new: NewAlias,
    ) -> Result<InsertOutcome<Alias>, AppError> {
        new.validate()?;
        if new.alias_value.trim().is_empty() {
            return Err(AppError::Validation("aliasValue cannot be blank".to_string()));
        }
        let concept = self
            .get_by_canonical_key(tenant_id, canonical_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Concept '{}' not found", canonical_key)))?;

        let outcome = self
            .aliases
            .insert_if_absent(Alias::from_new(concept.id, new))
            .await?;
        if let InsertOutcome::Inserted(alias) = &outcome {
            debug!(
                tenant_id,
                canonical_key = %concept.canonical_key,
                alias = %alias.alias_value,
                "Alias added"
            );
        }
        Ok(outcome)
    }

    /// Aliases of a concept, or `None` when the concept does not exist
    pub async fn list_aliases(
        &self,
        tenant_id: &str,
        canonical_key: &str,
    ) -> Result<Option<Vec<Alias>>, AppError> {
        match self.get_by_canonical_key(tenant_id, canonical_key).await? {
            Some(concept) => Ok(Some(self.aliases.list_for_concept(concept.id).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{AliasType, ConceptType};
    use crate::registry::standard_packs::builtin_packs;
    use crate::repository::Repositories;

    pub(crate) async fn seeded_store() -> (ConceptStore, Arc<StandardPackRegistry>) {
        let repos = Repositories::in_memory();
        let packs = Arc::new(StandardPackRegistry::new(repos.packs.clone()));
        packs.seed(builtin_packs()).await.unwrap();
        let store = ConceptStore::new(repos.concepts.clone(), repos.aliases.clone(), packs.clone());
        (store, packs)
    }

    pub(crate) fn new_concept(key: &str, domain: Domain, tier: i16, pack: Option<Uuid>) -> NewConcept {
        NewConcept {
            canonical_key: key.to_string(),
            label: key.replace('_', " "),
            description: None,
            domain,
            concept_type: ConceptType::Field,
            governance_tier: tier,
            standard_pack_id_primary: pack,
            standard_ref: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let (store, _) = seeded_store().await;
        store
            .create("t1", new_concept("customer_id", Domain::Scm, 3, None))
            .await
            .unwrap();

        let lower = store.get_by_canonical_key("t1", "customer_id").await.unwrap();
        let upper = store.get_by_canonical_key("t1", "CUSTOMER_ID").await.unwrap();
        assert!(lower.is_some());
        assert_eq!(lower, upper);

        // Tenants are isolated
        assert!(store.get_by_canonical_key("t2", "customer_id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_a_noop() {
        let (store, _) = seeded_store().await;
        let first = store
            .create("t1", new_concept("cost_center", Domain::Finance, 3, None))
            .await
            .unwrap();
        assert!(first.was_inserted());

        let mut again = new_concept("cost_center", Domain::Finance, 3, None);
        again.label = "Different label".to_string();
        let second = store.create("t1", again).await.unwrap();

        assert!(!second.was_inserted());
        assert_eq!(second.into_inner().label, "cost center");
    }

    #[tokio::test]
    async fn test_governance_rejection_writes_nothing() {
        let (store, packs) = seeded_store().await;
        let coso = packs.get_by_code("COSO").await.unwrap().unwrap();

        let err = store
            .create("t1", new_concept("revenue", Domain::Finance, 1, Some(coso.id)))
            .await
            .unwrap_err();

        assert!(matches!(&err, AppError::Governance(v) if v[0].code() == "INSUFFICIENT_AUTHORITY"));
        assert!(store.get_by_canonical_key("t1", "revenue").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_is_gated() {
        let (store, packs) = seeded_store().await;
        let ifrs = packs.get_by_code("IFRS_CORE").await.unwrap().unwrap();
        store
            .create("t1", new_concept("revenue", Domain::Finance, 1, Some(ifrs.id)))
            .await
            .unwrap();

        // Dropping the pack from a tier-1 finance concept is refused
        let patch = ConceptPatch {
            standard_pack_id_primary: Some(None),
            ..Default::default()
        };
        let err = store.update("t1", "revenue", patch).await.unwrap_err();
        assert!(matches!(err, AppError::Governance(_)));
        let stored = store.get_by_canonical_key("t1", "revenue").await.unwrap().unwrap();
        assert_eq!(stored.standard_pack_id_primary, Some(ifrs.id));

        // Relaxing the tier first makes the same change legal
        let patch = ConceptPatch {
            governance_tier: Some(3),
            standard_pack_id_primary: Some(None),
            ..Default::default()
        };
        let updated = store.update("t1", "REVENUE", patch).await.unwrap();
        assert_eq!(updated.governance_tier, 3);
        assert_eq!(updated.standard_pack_id_primary, None);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let (store, packs) = seeded_store().await;
        let ifrs = packs.get_by_code("IFRS_CORE").await.unwrap().unwrap();
        store.create("t1", new_concept("revenue", Domain::Finance, 1, Some(ifrs.id))).await.unwrap();
        store.create("t1", new_concept("employee_id", Domain::Hr, 3, None)).await.unwrap();
        store.create("t1", new_concept("accrued_revenue", Domain::Finance, 3, None)).await.unwrap();

        let all = store.list("t1", &ConceptFilter::default()).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|c| c.canonical_key.as_str()).collect();
        assert_eq!(keys, vec!["accrued_revenue", "employee_id", "revenue"]);

        let by_pack = ConceptFilter {
            standard_pack_key: Some("ifrs_core".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list("t1", &by_pack).await.unwrap().len(), 1);

        let search = ConceptFilter {
            search: Some("REVEN".to_string()),
            tier: Some(3),
            ..Default::default()
        };
        let found = store.list("t1", &search).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].canonical_key, "accrued_revenue");
    }

    #[tokio::test]
    async fn test_aliases_attach_idempotently() {
        let (store, _) = seeded_store().await;
        store.create("t1", new_concept("vendor", Domain::Scm, 3, None)).await.unwrap();

        let alias = NewAlias {
            alias_value: "Supplier".to_string(),
            alias_type: AliasType::Semantic,
            source_system: Some("sap".to_string()),
            language: None,
            is_preferred_for_display: true,
            notes: None,
        };
        assert!(store.add_alias("t1", "vendor", alias.clone()).await.unwrap().was_inserted());

        let mut shouted = alias;
        shouted.alias_value = "SUPPLIER".to_string();
        assert!(!store.add_alias("t1", "vendor", shouted).await.unwrap().was_inserted());

        let aliases = store.list_aliases("t1", "vendor").await.unwrap().unwrap();
        assert_eq!(aliases.len(), 1);
        assert!(store.list_aliases("t1", "missing").await.unwrap().is_none());
    }
}
