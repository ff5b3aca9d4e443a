//! Resolution facade
//!
//! The single entry point external callers go through. HTTP handlers and the
//! tool invoker both hold one shared facade; neither touches a repository.

use crate::error::AppError;
use crate::models::{Alias, Concept, MatchPath, StandardPack};
use crate::registry::{
    AliasResolver, ConceptStore, NamingVariantResolver, StandardPackRegistry,
};
use crate::repository::Repositories;
use serde::Serialize;
use std::sync::Arc;

/// A resolved concept with its primary pack and aliases attached
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptLookup {
    pub concept: Concept,
    pub matched_via: MatchPath,
    pub standard_pack: Option<StandardPack>,
    pub aliases: Vec<Alias>,
}

pub struct ResolutionFacade {
    concepts: ConceptStore,
    packs: Arc<StandardPackRegistry>,
    aliases: AliasResolver,
    naming: NamingVariantResolver,
}

impl ResolutionFacade {
    pub fn new(repos: &Repositories) -> Self {
        let packs = Arc::new(StandardPackRegistry::new(repos.packs.clone()));
        Self {
            concepts: ConceptStore::new(repos.concepts.clone(), repos.aliases.clone(), packs.clone()),
            packs,
            aliases: AliasResolver::new(
                repos.concepts.clone(),
                repos.aliases.clone(),
                repos.audit.clone(),
            ),
            naming: NamingVariantResolver::new(repos.naming.clone()),
        }
    }

    pub fn concepts(&self) -> &ConceptStore {
        &self.concepts
    }

    pub fn packs(&self) -> &StandardPackRegistry {
        &self.packs
    }

    pub fn aliases(&self) -> &AliasResolver {
        &self.aliases
    }

    pub fn naming(&self) -> &NamingVariantResolver {
        &self.naming
    }

    /// Resolve a term and gather everything a caller needs to display it
    pub async fn lookup_concept(&self, tenant_id: &str, term: &str) -> Result<Option<ConceptLookup>, AppError> {
        let Some(resolution) = self.aliases.resolve(term, tenant_id).await? else {
            return Ok(None);
        };

        let standard_pack = match resolution.concept.standard_pack_id_primary {
            Some(id) => self.packs.get_by_id(id).await?,
            None => None,
        };
        let aliases = self
            .concepts
            .list_aliases(tenant_id, &resolution.concept.canonical_key)
            .await?
            .unwrap_or_default();

        Ok(Some(ConceptLookup {
            concept: resolution.concept,
            matched_via: resolution.matched_via,
            standard_pack,
            aliases,
        }))
    }
}
