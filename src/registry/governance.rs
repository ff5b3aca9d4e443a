//! Governance gate for concept writes
//!
//! Pure rule evaluation: the caller resolves the referenced standard pack and
//! hands it in, so the rules can be exercised without any storage.

use crate::models::{AuthorityLevel, Domain, StandardPack};
use serde::{Serialize, Serializer};
use uuid::Uuid;

pub const MIN_TIER: i16 = 1;
pub const MAX_TIER: i16 = 4;

/// Tiers at or below this value are strictly governed in regulated domains
const STRICT_TIER_CEILING: i16 = 2;

/// A single, enumerable governance rule failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceViolation {
    InvalidTier(i16),
    MissingStandardPack,
    UnknownStandardPack(Uuid),
    InsufficientAuthority {
        pack_code: String,
        found: AuthorityLevel,
    },
}

impl GovernanceViolation {
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceViolation::InvalidTier(_) => "INVALID_TIER",
            GovernanceViolation::MissingStandardPack => "MISSING_STANDARD_PACK",
            GovernanceViolation::UnknownStandardPack(_) => "UNKNOWN_STANDARD_PACK",
            GovernanceViolation::InsufficientAuthority { .. } => "INSUFFICIENT_AUTHORITY",
        }
    }

    pub fn message(&self) -> String {
        match self {
            GovernanceViolation::InvalidTier(tier) => format!(
                "governanceTier {} is outside the allowed range {}..={}",
                tier, MIN_TIER, MAX_TIER
            ),
            GovernanceViolation::MissingStandardPack => {
                "standardPackIdPrimary is required for FINANCE concepts at tier 1 or 2".to_string()
            }
            GovernanceViolation::UnknownStandardPack(id) => {
                format!("standard pack {} does not exist", id)
            }
            GovernanceViolation::InsufficientAuthority { pack_code, found } => format!(
                "standard pack {} has authority {}, FINANCE tier 1-2 concepts require LAW",
                pack_code, found
            ),
        }
    }
}

impl std::fmt::Display for GovernanceViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl Serialize for GovernanceViolation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("GovernanceViolation", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.message())?;
        state.end()
    }
}

/// Outcome of a governance check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<GovernanceViolation>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<GovernanceViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Error strings in `CODE: message` form
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

/// Stateless tier/domain rule set
#[derive(Debug, Clone, Copy, Default)]
pub struct GovernanceValidator;

impl GovernanceValidator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule; violations accumulate rather than short-circuit.
    ///
    /// `resolved_pack` is the pack `standard_pack_id` points at, or `None` if it
    /// could not be found.
    pub fn validate(
        &self,
        domain: Domain,
        tier: i16,
        standard_pack_id: Option<Uuid>,
        resolved_pack: Option<&StandardPack>,
    ) -> ValidationResult {
        let mut errors = Vec::new();

        if !(MIN_TIER..=MAX_TIER).contains(&tier) {
            errors.push(GovernanceViolation::InvalidTier(tier));
        }

        if domain == Domain::Finance && (MIN_TIER..=STRICT_TIER_CEILING).contains(&tier) {
            match (standard_pack_id, resolved_pack) {
                (None, _) => errors.push(GovernanceViolation::MissingStandardPack),
                (Some(id), None) => errors.push(GovernanceViolation::UnknownStandardPack(id)),
                (Some(id), Some(pack)) if pack.id != id => {
                    errors.push(GovernanceViolation::UnknownStandardPack(id))
                }
                (Some(_), Some(pack)) => {
                    if pack.authority_level != AuthorityLevel::Law {
                        errors.push(GovernanceViolation::InsufficientAuthority {
                            pack_code: pack.code.clone(),
                            found: pack.authority_level,
                        });
                    }
                }
            }
        }

        ValidationResult::from_errors(errors)
    }
}
