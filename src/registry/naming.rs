//! Naming variant resolution
//!
//! Converts canonical keys into context-specific spellings. A missing variant
//! is a normal state: the canonical key itself is returned.

use crate::error::AppError;
use crate::models::NamingVariant;
use crate::repository::NamingVariantRepository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct NamingVariantResolver {
    repo: Arc<dyn NamingVariantRepository>,
}

impl NamingVariantResolver {
    pub fn new(repo: Arc<dyn NamingVariantRepository>) -> Self {
        Self { repo }
    }

    /// Variant of `canonical_key` in `context`, or the key itself
    pub async fn resolve_for_context(&self, canonical_key: &str, context: &str) -> Result<String, AppError> {
        let keys = [canonical_key.to_string()];
        let mut found = self.repo.find_many(&keys, context).await?;
        match found.remove(canonical_key) {
            Some(value) => Ok(value),
            None => {
                warn!(canonical_key, context, "No naming variant, falling back to canonical key");
                Ok(canonical_key.to_string())
            }
        }
    }

    /// Resolve many keys in one round trip. The result holds exactly one entry
    /// per distinct input key.
    pub async fn batch_resolve(
        &self,
        canonical_keys: &[String],
        context: &str,
    ) -> Result<HashMap<String, String>, AppError> {
        let mut seen = HashSet::new();
        let keys: Vec<String> = canonical_keys
            .iter()
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut found = self.repo.find_many(&keys, context).await?;
        let mut missing = 0usize;
        let results = keys
            .into_iter()
            .map(|key| match found.remove(&key) {
                Some(value) => (key, value),
                None => {
                    missing += 1;
                    (key.clone(), key)
                }
            })
            .collect::<HashMap<_, _>>();

        if missing > 0 {
            warn!(context, missing, total = results.len(), "Naming variants missing, using canonical keys");
        }
        Ok(results)
    }

    /// Create or replace the spelling of a key in a context
    pub async fn upsert_variant(&self, variant: NamingVariant) -> Result<NamingVariant, AppError> {
        if variant.canonical_key.trim().is_empty() || variant.context.trim().is_empty() {
            return Err(AppError::Validation(
                "canonicalKey and context are required".to_string(),
            ));
        }
        if variant.value.trim().is_empty() {
            return Err(AppError::Validation("value cannot be blank".to_string()));
        }
        self.repo.upsert(variant.clone()).await?;
        debug!(
            canonical_key = %variant.canonical_key,
            context = %variant.context,
            "Naming variant stored"
        );
        Ok(variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    fn variant(key: &str, context: &str, value: &str) -> NamingVariant {
        NamingVariant {
            canonical_key: key.to_string(),
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_variant_falls_back_to_key() {
        let resolver = NamingVariantResolver::new(Arc::new(MemoryStore::new()));
        let value = resolver.resolve_for_context("revenue", "unknown_context").await.unwrap();
        assert_eq!(value, "revenue");
    }

    #[tokio::test]
    async fn test_stored_variant_is_returned() {
        let resolver = NamingVariantResolver::new(Arc::new(MemoryStore::new()));
        assert_ok!(resolver.upsert_variant(variant("net_revenue", "java", "netRevenue")).await);
        assert_ok!(resolver.upsert_variant(variant("net_revenue", "java", "netRevenueAmount")).await);

        let value = resolver.resolve_for_context("net_revenue", "java").await.unwrap();
        assert_eq!(value, "netRevenueAmount");
    }

    #[tokio::test]
    async fn test_batch_returns_one_entry_per_key() {
        let resolver = NamingVariantResolver::new(Arc::new(MemoryStore::new()));
        resolver.upsert_variant(variant("a", "sql", "A_COL")).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let results = resolver.batch_resolve(&keys, "sql").await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["a"], "A_COL");
        assert_eq!(results["b"], "b");
    }

    #[tokio::test]
    async fn test_blank_variant_is_rejected() {
        let resolver = NamingVariantResolver::new(Arc::new(MemoryStore::new()));
        let err = assert_err!(resolver.upsert_variant(variant("a", "sql", " ")).await);
        assert!(matches!(err, AppError::Validation(_)));
    }
}
