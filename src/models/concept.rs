//! Concept registry models
//!
//! Canonical concepts, their aliases, standard packs and naming variants.

use super::text_enum;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

/// snake_case canonical keys: lowercase letter first, then letters, digits, underscores
static CANONICAL_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("canonical key pattern is valid"));

/// Business domain a concept or standard pack belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    Finance,
    Hr,
    Scm,
    It,
    Other,
}

text_enum!(Domain {
    Finance => "FINANCE",
    Hr => "HR",
    Scm => "SCM",
    It => "IT",
    Other => "OTHER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConceptType {
    Field,
    Entity,
    ServiceRule,
}

text_enum!(ConceptType {
    Field => "FIELD",
    Entity => "ENTITY",
    ServiceRule => "SERVICE_RULE",
});

/// How binding a standard pack is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorityLevel {
    Law,
    Guidance,
    Internal,
}

text_enum!(AuthorityLevel {
    Law => "LAW",
    Guidance => "GUIDANCE",
    Internal => "INTERNAL",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackStatus {
    Active,
    Deprecated,
    Draft,
}

text_enum!(PackStatus {
    Active => "ACTIVE",
    Deprecated => "DEPRECATED",
    Draft => "DRAFT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AliasType {
    Semantic,
    Lexical,
}

text_enum!(AliasType {
    Semantic => "SEMANTIC",
    Lexical => "LEXICAL",
});

/// Which path of the resolver produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPath {
    CanonicalKey,
    Alias,
}

text_enum!(MatchPath {
    CanonicalKey => "canonical_key",
    Alias => "alias",
});

/// A tenant-scoped canonical business concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: Uuid,
    pub tenant_id: String,
    pub canonical_key: String,
    pub label: String,
    pub description: Option<String>,
    pub domain: Domain,
    pub concept_type: ConceptType,
    pub governance_tier: i16,
    pub standard_pack_id_primary: Option<Uuid>,
    pub standard_ref: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Materialize a new row for `tenant_id` from a create request
    pub fn from_new(tenant_id: &str, new: NewConcept) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            canonical_key: new.canonical_key,
            label: new.label,
            description: new.description,
            domain: new.domain,
            concept_type: new.concept_type,
            governance_tier: new.governance_tier,
            standard_pack_id_primary: new.standard_pack_id_primary,
            standard_ref: new.standard_ref,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update, returning the merged concept
    pub fn patched(&self, patch: &ConceptPatch) -> Self {
        let mut next = self.clone();
        if let Some(label) = &patch.label {
            next.label = label.clone();
        }
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        if let Some(tier) = patch.governance_tier {
            next.governance_tier = tier;
        }
        if let Some(pack) = patch.standard_pack_id_primary {
            next.standard_pack_id_primary = pack;
        }
        if let Some(standard_ref) = &patch.standard_ref {
            next.standard_ref = standard_ref.clone();
        }
        if let Some(active) = patch.is_active {
            next.is_active = active;
        }
        next.updated_at = Utc::now();
        next
    }
}

fn default_true() -> bool {
    true
}

/// Request to register a concept
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewConcept {
    #[validate(length(min = 1, max = 128, message = "canonicalKey must be between 1 and 128 characters"))]
    #[validate(custom(function = "validate_canonical_key"))]
    pub canonical_key: String,
    #[validate(length(min = 1, max = 255, message = "label is required"))]
    pub label: String,
    pub description: Option<String>,
    pub domain: Domain,
    pub concept_type: ConceptType,
    pub governance_tier: i16,
    pub standard_pack_id_primary: Option<Uuid>,
    pub standard_ref: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Partial update of a concept. Nullable columns use a double option:
/// absent leaves the value alone, `null` clears it.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConceptPatch {
    #[validate(length(min = 1, max = 255, message = "label cannot be empty"))]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub governance_tier: Option<i16>,
    #[serde(default, deserialize_with = "double_option")]
    pub standard_pack_id_primary: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub standard_ref: Option<Option<String>>,
    pub is_active: Option<bool>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Validate a snake_case canonical key
pub fn validate_canonical_key(key: &str) -> Result<(), validator::ValidationError> {
    if !CANONICAL_KEY_RE.is_match(key) {
        let mut err = validator::ValidationError::new("invalid_canonical_key");
        err.message = Some(
            "canonicalKey must be snake_case: start with a lowercase letter and contain only lowercase letters, digits, underscores"
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// A synonym attached to exactly one concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub id: Uuid,
    pub concept_id: Uuid,
    pub alias_value: String,
    pub alias_type: AliasType,
    pub source_system: Option<String>,
    pub language: Option<String>,
    pub is_preferred_for_display: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Alias {
    pub fn from_new(concept_id: Uuid, new: NewAlias) -> Self {
        Self {
            id: Uuid::new_v4(),
            concept_id,
            alias_value: new.alias_value.trim().to_string(),
            alias_type: new.alias_type,
            source_system: new.source_system,
            language: new.language.map(|l| l.to_lowercase()),
            is_preferred_for_display: new.is_preferred_for_display,
            notes: new.notes,
            created_at: Utc::now(),
        }
    }
}

/// Request to attach an alias to a concept
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAlias {
    #[validate(length(min = 1, max = 255, message = "aliasValue must be between 1 and 255 characters"))]
    pub alias_value: String,
    pub alias_type: AliasType,
    pub source_system: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub is_preferred_for_display: bool,
    pub notes: Option<String>,
}

/// An alias together with the concept it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMatch {
    pub alias: Alias,
    pub concept: Concept,
}

/// A platform-owned regulatory or reference pack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardPack {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub domain: Domain,
    pub authority_level: AuthorityLevel,
    pub version: String,
    pub status: PackStatus,
}

/// A context-specific spelling of a canonical key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingVariant {
    pub canonical_key: String,
    pub context: String,
    pub value: String,
}

/// Filters accepted by concept listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConceptFilter {
    pub domain: Option<Domain>,
    pub standard_pack_key: Option<String>,
    pub tier: Option<i16>,
    pub search: Option<String>,
}

/// Result of a successful term resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub concept: Concept,
    pub matched_via: MatchPath,
}

/// One recorded resolver lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupAuditEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub term: String,
    pub found: bool,
    pub concept_id: Option<Uuid>,
    pub matched_via: Option<MatchPath>,
    pub recorded_at: DateTime<Utc>,
}
