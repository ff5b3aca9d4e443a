//! Tool invocation for agent-style callers
//!
//! Every reply carries a governance envelope describing the tool that produced
//! it. The registry check runs before dispatch, so a disabled tool yields an
//! error envelope and never a partial result.

use crate::config::ToolConfig;
use crate::error::AppError;
use crate::facade::ResolutionFacade;
use crate::models::Domain;
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const LOOKUP_CONCEPT: &str = "lookup_concept";
pub const LIST_STANDARD_PACKS: &str = "list_standard_packs";

/// Static description of a registered tool
#[derive(Debug, Clone, Copy)]
pub struct ToolDescriptor {
    pub tool_id: &'static str,
    pub domain: &'static str,
    pub category: &'static str,
    pub severity: &'static str,
    pub description: &'static str,
}

const TOOLS: &[ToolDescriptor] = &[
    ToolDescriptor {
        tool_id: LOOKUP_CONCEPT,
        domain: "metadata",
        category: "concept_resolution",
        severity: "low",
        description: "Resolve a business term to its governed concept",
    },
    ToolDescriptor {
        tool_id: LIST_STANDARD_PACKS,
        domain: "metadata",
        category: "reference_data",
        severity: "low",
        description: "List regulatory and reference standard packs",
    },
];

/// Envelope attached to replies for ids that are not registered
const UNREGISTERED: ToolDescriptor = ToolDescriptor {
    tool_id: "",
    domain: "unknown",
    category: "unregistered",
    severity: "high",
    description: "",
};

/// Which tools exist and which are switched off
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    disabled: HashSet<String>,
}

impl ToolRegistry {
    pub fn from_config(config: &ToolConfig) -> Self {
        let disabled: HashSet<String> = config
            .disabled_tools
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        for id in &disabled {
            if Self::descriptor(id).is_none() {
                warn!("DISABLED_TOOLS names unknown tool '{}'", id);
            }
        }
        Self { disabled }
    }

    pub fn descriptor(tool_id: &str) -> Option<&'static ToolDescriptor> {
        TOOLS.iter().find(|t| t.tool_id == tool_id)
    }

    pub fn is_enabled(&self, tool_id: &str) -> bool {
        !self.disabled.contains(tool_id)
    }

    /// Registered tools with their enablement
    pub fn list(&self) -> Vec<Value> {
        TOOLS
            .iter()
            .map(|t| {
                json!({
                    "toolId": t.tool_id,
                    "description": t.description,
                    "domain": t.domain,
                    "category": t.category,
                    "severity": t.severity,
                    "enabled": self.is_enabled(t.tool_id),
                })
            })
            .collect()
    }
}

/// A tool reply: the enveloped body plus the HTTP status to send it with
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub status: StatusCode,
    pub body: Value,
}

pub struct ToolInvoker {
    registry: ToolRegistry,
    facade: Arc<ResolutionFacade>,
}

impl ToolInvoker {
    pub fn new(registry: ToolRegistry, facade: Arc<ResolutionFacade>) -> Self {
        Self { registry, facade }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Check the registry, dispatch, and wrap the outcome in a governance envelope
    pub async fn invoke(&self, tool_id: &str, tenant_id: &str, args: &Value) -> ToolReply {
        let Some(descriptor) = ToolRegistry::descriptor(tool_id) else {
            warn!(tool_id, "Invocation of unknown tool");
            let envelope = governance(&UNREGISTERED, tool_id);
            return ToolReply {
                status: StatusCode::NOT_FOUND,
                body: error_body(
                    "TOOL_NOT_FOUND",
                    &format!("Tool '{}' is not registered", tool_id),
                    envelope,
                ),
            };
        };
        let envelope = governance(descriptor, tool_id);

        if !self.registry.is_enabled(tool_id) {
            let err = AppError::ToolDisabled(format!("Tool '{}' is disabled", tool_id));
            warn!(tool_id, tenant_id, "Invocation of disabled tool refused");
            return ToolReply {
                status: err.status(),
                body: error_body(err.code(), &err.to_string(), envelope),
            };
        }

        match self.dispatch(tool_id, tenant_id, args).await {
            Ok(Value::Object(mut payload)) => {
                debug!(tool_id, tenant_id, "Tool invocation succeeded");
                payload.insert("governance".to_string(), envelope);
                ToolReply {
                    status: StatusCode::OK,
                    body: Value::Object(payload),
                }
            }
            Ok(other) => ToolReply {
                status: StatusCode::OK,
                body: json!({ "result": other, "governance": envelope }),
            },
            Err(err) => {
                if err.status().is_server_error() {
                    error!(tool_id, tenant_id, error = %err, "Tool invocation failed");
                }
                let code = match &err {
                    AppError::Validation(_) | AppError::BadRequest(_) => "INVALID_ARGUMENTS",
                    other => other.code(),
                };
                ToolReply {
                    status: err.status(),
                    body: error_body(code, &err.to_string(), envelope),
                }
            }
        }
    }

    async fn dispatch(&self, tool_id: &str, tenant_id: &str, args: &Value) -> Result<Value, AppError> {
        match tool_id {
            LOOKUP_CONCEPT => self.lookup_concept(tenant_id, args).await,
            LIST_STANDARD_PACKS => self.list_standard_packs(args).await,
            other => Err(AppError::Internal(format!("Tool '{}' has no handler", other))),
        }
    }

    async fn lookup_concept(&self, tenant_id: &str, args: &Value) -> Result<Value, AppError> {
        let term = get_str(args, "term")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("'term' is required".to_string()))?;

        Ok(match self.facade.lookup_concept(tenant_id, term).await? {
            Some(lookup) => json!({
                "found": true,
                "concept": lookup.concept,
                "matchedVia": lookup.matched_via,
                "standardPack": lookup.standard_pack,
                "aliases": lookup.aliases,
            }),
            None => json!({ "found": false }),
        })
    }

    async fn list_standard_packs(&self, args: &Value) -> Result<Value, AppError> {
        let domain = match get_str(args, "domain").map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(raw.parse::<Domain>()?),
            None => None,
        };
        let packs = self.facade.packs().list(domain).await?;
        Ok(json!({ "count": packs.len(), "standardPacks": packs }))
    }
}

fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn governance(descriptor: &ToolDescriptor, tool_id: &str) -> Value {
    json!({
        "toolId": tool_id,
        "domain": descriptor.domain,
        "category": descriptor.category,
        "severity": descriptor.severity,
    })
}

fn error_body(code: &str, message: &str, envelope: Value) -> Value {
    json!({
        "error": { "code": code, "message": message },
        "governance": envelope,
    })
}
