//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod extract;
mod jobs;
mod metadata;
mod naming;
mod tools;

use crate::config::Settings;
use crate::state::SharedState;
use crate::tenant::{tenant_middleware, API_KEY_HEADER, TENANT_HEADER};
use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware_stack = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(TimeoutLayer::new(settings.server.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Everything except the health check runs inside a tenant
    let tenant_routes = Router::new()
        // Concepts
        .route(
            "/metadata/concepts",
            get(metadata::list_concepts).post(metadata::create_concept),
        )
        .route(
            "/metadata/concepts/{canonical_key}",
            get(metadata::get_concept).patch(metadata::update_concept),
        )
        .route("/metadata/resolve", get(metadata::resolve_term))
        .route("/metadata/resolve/audit", get(metadata::lookup_audit))

        // Aliases and glossary
        .route("/metadata/aliases/resolve", get(metadata::resolve_aliases))
        .route(
            "/metadata/aliases/concept/{canonical_key}",
            get(metadata::list_concept_aliases).post(metadata::add_alias),
        )
        .route("/metadata/glossary/search", get(metadata::search_glossary))

        // Standard packs
        .route("/metadata/standard-packs", get(metadata::list_standard_packs))
        .route("/metadata/standard-packs/{code}", get(metadata::get_standard_pack))

        // Naming variants
        .route("/naming/resolve/batch", post(naming::batch_resolve))
        .route("/naming/resolve/{canonical_key}", get(naming::resolve_name))
        .route("/naming/variants", put(naming::upsert_variant))

        // Profile jobs
        .route(
            "/jobs/profile",
            get(jobs::job_history).post(jobs::schedule_job),
        )
        .route("/jobs/profile/due", get(jobs::due_jobs))
        .route("/jobs/profile/{id}", get(jobs::get_job))
        .route("/jobs/profile/{id}/start", post(jobs::start_job))
        .route("/jobs/profile/{id}/complete", post(jobs::complete_job))
        .route("/jobs/profile/{id}/fail", post(jobs::fail_job))

        // Tool invocation
        .route("/tools", get(tools::list_tools))
        .route("/tools/{tool_id}/invoke", post(tools::invoke_tool))
        .route_layer(middleware::from_fn_with_state(state.clone(), tenant_middleware));

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .merge(tenant_routes)

        // Apply middleware and state
        .layer(middleware_stack)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::OPTIONS,
    ];
    let headers = [
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static(TENANT_HEADER),
        HeaderName::from_static(API_KEY_HEADER),
    ];

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };
    cors.allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
