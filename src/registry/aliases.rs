//! Term resolution
//!
//! Maps free text onto a tenant's concepts, first by canonical key and then
//! through aliases. Every `resolve` call leaves an audit record behind.

use crate::error::AppError;
use crate::models::{AliasMatch, Domain, LookupAuditEntry, MatchPath, Resolution};
use crate::repository::{AliasRepository, ConceptRepository, LookupAuditRepository};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on glossary search hits
const GLOSSARY_LIMIT: usize = 50;

pub struct AliasResolver {
    concepts: Arc<dyn ConceptRepository>,
    aliases: Arc<dyn AliasRepository>,
    audit: Arc<dyn LookupAuditRepository>,
}

impl AliasResolver {
    pub fn new(
        concepts: Arc<dyn ConceptRepository>,
        aliases: Arc<dyn AliasRepository>,
        audit: Arc<dyn LookupAuditRepository>,
    ) -> Self {
        Self {
            concepts,
            aliases,
            audit,
        }
    }

    /// Resolve a term to a single concept.
    ///
    /// A canonical key match always wins. Otherwise the best alias match is
    /// taken: preferred-for-display aliases first, then the owning concept's
    /// key in alphabetical order.
    pub async fn resolve(&self, term: &str, tenant_id: &str) -> Result<Option<Resolution>, AppError> {
        let normalized = term.trim().to_lowercase();
        if normalized.is_empty() {
            return Ok(None);
        }

        let resolution = match self.concepts.find_by_key(tenant_id, &normalized).await? {
            Some(concept) => Some(Resolution {
                concept,
                matched_via: MatchPath::CanonicalKey,
            }),
            None => self
                .aliases
                .find_matches(tenant_id, &normalized)
                .await?
                .into_iter()
                .next()
                .map(|m| Resolution {
                    concept: m.concept,
                    matched_via: MatchPath::Alias,
                }),
        };

        debug!(
            tenant_id,
            term = %normalized,
            found = resolution.is_some(),
            "Term resolved"
        );
        self.record_lookup(tenant_id, normalized, resolution.as_ref());
        Ok(resolution)
    }

    /// Write the audit record on a detached task; its outcome never reaches the caller.
    fn record_lookup(&self, tenant_id: &str, term: String, resolution: Option<&Resolution>) {
        let entry = LookupAuditEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            term,
            found: resolution.is_some(),
            concept_id: resolution.map(|r| r.concept.id),
            matched_via: resolution.map(|r| r.matched_via),
            recorded_at: Utc::now(),
        };
        let audit = self.audit.clone();
        tokio::spawn(async move {
            let term = entry.term.clone();
            if let Err(e) = audit.record(entry).await {
                warn!(term = %term, error = %e, "Failed to record lookup audit entry");
            }
        });
    }

    /// A tenant's most recent lookups, newest first
    pub async fn recent_lookups(&self, tenant_id: &str, limit: usize) -> Result<Vec<LookupAuditEntry>, AppError> {
        self.audit.recent(tenant_id, limit).await
    }

    /// Every concept an alias text may refer to.
    ///
    /// With `language`, rows in another language are dropped (language-less rows
    /// stay). Concepts in `context_domain` rank first.
    pub async fn resolve_alias(
        &self,
        tenant_id: &str,
        alias_text: &str,
        context_domain: Option<Domain>,
        language: Option<&str>,
    ) -> Result<Vec<AliasMatch>, AppError> {
        let text = alias_text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let language = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());

        let mut matches: Vec<AliasMatch> = self
            .aliases
            .find_matches(tenant_id, text)
            .await?
            .into_iter()
            .filter(|m| match (&language, &m.alias.language) {
                (Some(wanted), Some(lang)) => lang.eq_ignore_ascii_case(wanted),
                _ => true,
            })
            .collect();

        // Stable: keeps the repository's preferred/key ordering inside each group
        if let Some(domain) = context_domain {
            matches.sort_by_key(|m| m.concept.domain != domain);
        }
        Ok(matches)
    }

    /// Substring search over alias values, concept keys and labels
    pub async fn search_glossary(&self, tenant_id: &str, q: &str) -> Result<Vec<AliasMatch>, AppError> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        self.aliases.search(tenant_id, q, GLOSSARY_LIMIT).await
    }
}
