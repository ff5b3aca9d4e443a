//! Tool invocation route handlers

use super::extract::AppPath;
use crate::error::{validation_error, ApiResult};
use crate::state::SharedState;
use crate::tenant::TenantContext;
use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::debug;

/// Registered tools and whether each is enabled
pub async fn list_tools(State(state): State<SharedState>) -> Json<Vec<Value>> {
    Json(state.tools.registry().list())
}

/// Invoke a tool. An empty body means no arguments.
pub async fn invoke_tool(
    State(state): State<SharedState>,
    Extension(tenant): Extension<TenantContext>,
    AppPath(tool_id): AppPath<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let args: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| validation_error(format!("Invalid tool arguments: {}", e)))?
    };
    debug!(
        tenant_id = %tenant.tenant_id,
        service_caller = tenant.service_caller,
        "Invoking tool {}",
        tool_id
    );

    let reply = state.tools.invoke(&tool_id, &tenant.tenant_id, &args).await;
    Ok((reply.status, Json(reply.body)))
}
