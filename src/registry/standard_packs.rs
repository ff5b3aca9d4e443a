//! Standard pack registry
//!
//! Global, platform-owned regulatory and reference packs.

use crate::error::AppError;
use crate::models::{AuthorityLevel, Domain, PackStatus, StandardPack};
use crate::repository::StandardPackRepository;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Packs every installation starts with: (code, name, domain, authority, version)
const BUILTIN_PACKS: &[(&str, &str, Domain, AuthorityLevel, &str)] = &[
    ("COSO", "COSO Internal Control Framework", Domain::Finance, AuthorityLevel::Guidance, "2013"),
    ("GAAP_US", "US Generally Accepted Accounting Principles", Domain::Finance, AuthorityLevel::Law, "2024"),
    ("GDPR", "EU General Data Protection Regulation", Domain::It, AuthorityLevel::Law, "2016/679"),
    ("IFRS_CORE", "IFRS Core Standards", Domain::Finance, AuthorityLevel::Law, "2024"),
    ("INTERNAL_GLOSSARY", "Internal Business Glossary", Domain::Other, AuthorityLevel::Internal, "1.0"),
    ("ISO_8000", "ISO 8000 Data Quality", Domain::Other, AuthorityLevel::Guidance, "2022"),
    ("SOX", "Sarbanes-Oxley Act", Domain::Finance, AuthorityLevel::Law, "2002"),
];

pub fn builtin_packs() -> Vec<StandardPack> {
    BUILTIN_PACKS
        .iter()
        .map(|(code, name, domain, authority, version)| StandardPack {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            domain: *domain,
            authority_level: *authority,
            version: version.to_string(),
            status: PackStatus::Active,
        })
        .collect()
}

pub struct StandardPackRegistry {
    repo: Arc<dyn StandardPackRepository>,
}

impl StandardPackRegistry {
    pub fn new(repo: Arc<dyn StandardPackRepository>) -> Self {
        Self { repo }
    }

    /// Packs ordered by code, optionally restricted to one domain
    pub async fn list(&self, domain: Option<Domain>) -> Result<Vec<StandardPack>, AppError> {
        self.repo.list(domain).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<StandardPack>, AppError> {
        self.repo.find_by_id(id).await
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<StandardPack>, AppError> {
        self.repo.find_by_code(code.trim()).await
    }

    /// Insert any pack whose code is not registered yet. Safe to call repeatedly;
    /// returns the number of packs actually added.
    pub async fn seed(&self, packs: Vec<StandardPack>) -> Result<usize, AppError> {
        let mut added = 0;
        for pack in packs {
            let code = pack.code.clone();
            if self.repo.insert_if_absent(pack).await?.was_inserted() {
                debug!("Seeded standard pack {}", code);
                added += 1;
            }
        }
        info!("Standard pack seeding complete ({} added)", added);
        Ok(added)
    }
}
