//! Metagov API - Multi-tenant Metadata Governance Engine
//!
//! Canonical business concepts with aliases and regulatory standard packs,
//! a tiered governance gate on writes, context-specific naming variants and
//! exactly-once scheduling of data profiling jobs.

mod config;
mod error;
mod facade;
mod models;
mod registry;
mod repository;
mod routes;
mod scheduler;
mod state;
mod tenant;
mod tools;

use crate::config::{DatabaseConfig, Settings};
use crate::registry::builtin_packs;
use crate::repository::Repositories;
use crate::routes::create_router;
use crate::state::AppState;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Metagov - Metadata Governance Engine...");

    // Load configuration; a missing DATABASE_URL stops us here
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Initialize database pool - REQUIRED (no fallback to in-memory)
    let pool = init_database_pool(&settings.database).await?;
    info!("✅ Database pool created successfully");

    repository::schema::migrate(&pool).await?;

    let repos = Repositories::postgres(pool);
    let state = Arc::new(AppState::new(&repos, &settings));

    let seeded = state.facade.packs().seed(builtin_packs()).await?;
    info!("📦 Standard packs ready ({} newly seeded)", seeded);

    // Durable retries and retention run in the background
    let sweeper = scheduler::spawn_sweeper(state.scheduler.clone());

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Concepts ───");
    info!("   GET   /metadata/concepts                      - List concepts");
    info!("   POST  /metadata/concepts                      - Register a concept");
    info!("   GET   /metadata/concepts/{{key}}                - Get a concept");
    info!("   PATCH /metadata/concepts/{{key}}                - Update a concept");
    info!("   GET   /metadata/resolve?term=                 - Resolve a term");
    info!("   GET   /metadata/resolve/audit?limit=          - Recent lookups");
    info!("");
    info!("   ─── Aliases & Packs ───");
    info!("   GET   /metadata/aliases/resolve?alias_text=   - Candidate concepts");
    info!("   GET   /metadata/aliases/concept/{{key}}         - Aliases of a concept");
    info!("   GET   /metadata/glossary/search?q=            - Glossary search");
    info!("   GET   /metadata/standard-packs                - Standard packs");
    info!("");
    info!("   ─── Naming ───");
    info!("   GET   /naming/resolve/{{key}}?context=          - Resolve a name");
    info!("   POST  /naming/resolve/batch                   - Resolve many names");
    info!("   PUT   /naming/variants                        - Save a variant");
    info!("");
    info!("   ─── Profile Jobs ───");
    info!("   POST  /jobs/profile                           - Schedule a profile run");
    info!("   GET   /jobs/profile/due?limit=                - Jobs ready to run");
    info!("   GET   /jobs/profile/{{id}}                      - Job status");
    info!("");
    info!("   ─── Tools ───");
    info!("   GET   /tools                                  - Registered tools");
    info!("   POST  /tools/{{tool_id}}/invoke                 - Invoke a tool");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,metagov_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Build and verify the connection pool
async fn init_database_pool(database: &DatabaseConfig) -> anyhow::Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(database.host.clone());
    cfg.port = Some(database.port);
    cfg.user = Some(database.user.clone());
    cfg.password = Some(database.password.clone());
    cfg.dbname = Some(database.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(database.max_pool_size));

    let pool = if database.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Fail before binding the listener if the database is unreachable
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;
    client
        .query_one("SELECT 1 as ok", &[])
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

    info!(
        "✅ Database connection successful ({}:{}/{}, TLS: {})",
        database.host, database.port, database.database, database.require_tls
    );
    Ok(pool)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
