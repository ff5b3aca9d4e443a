//! Tenant isolation middleware
//!
//! Every metadata, naming, job and tool route runs inside a tenant. The tenant
//! comes from the `x-tenant-id` header; service callers may additionally send
//! an `x-api-key` that must match one of the configured SHA-256 digests.

use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Longest accepted tenant id
const MAX_TENANT_LEN: usize = 128;

/// The tenant a request acts for, inserted into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    /// Whether the caller authenticated with an API key
    pub service_caller: bool,
}

/// Lowercase hex SHA-256 of a raw API key
pub fn hash_api_key(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Resolve the tenant and check the optional API key
pub async fn tenant_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let tenant_id = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", TENANT_HEADER)))?
        .to_string();

    if tenant_id.len() > MAX_TENANT_LEN {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters",
            TENANT_HEADER, MAX_TENANT_LEN
        )));
    }

    let service_caller = match request.headers().get(API_KEY_HEADER) {
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid API key".to_string()))?;
            let digest = hash_api_key(raw.trim());
            if !state.api_key_hashes.iter().any(|h| h == &digest) {
                // Never log the key itself
                warn!(tenant_id = %tenant_id, "Rejected request with unknown API key");
                return Err(AppError::Unauthorized("Invalid API key".to_string()));
            }
            true
        }
        None => false,
    };

    request.extensions_mut().insert(TenantContext {
        tenant_id,
        service_caller,
    });

    Ok(next.run(request).await)
}
