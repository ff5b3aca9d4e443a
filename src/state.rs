//! Application state management
//!
//! Contains shared state accessible across all handlers. Services are built
//! once from the repository bundle and the loaded settings.

use crate::config::Settings;
use crate::facade::ResolutionFacade;
use crate::repository::Repositories;
use crate::scheduler::ProfileJobScheduler;
use crate::tools::{ToolInvoker, ToolRegistry};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Concept, pack, alias and naming resolution
    pub facade: Arc<ResolutionFacade>,

    /// Profile job lifecycle
    pub scheduler: Arc<ProfileJobScheduler>,

    /// Tool-invocation surface for agent callers
    pub tools: ToolInvoker,

    /// Accepted `x-api-key` digests (lowercase SHA-256 hex)
    pub api_key_hashes: Vec<String>,
}

impl AppState {
    pub fn new(repos: &Repositories, settings: &Settings) -> Self {
        let facade = Arc::new(ResolutionFacade::new(repos));
        let scheduler = Arc::new(ProfileJobScheduler::new(
            repos.jobs.clone(),
            settings.scheduler.clone(),
        ));
        let tools = ToolInvoker::new(ToolRegistry::from_config(&settings.tools), facade.clone());

        Self {
            facade,
            scheduler,
            tools,
            api_key_hashes: settings.api_keys.key_hashes.clone(),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
