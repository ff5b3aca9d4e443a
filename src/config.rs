//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.
//! Every component receives its own slice of [`Settings`] through its constructor;
//! nothing reads the environment after startup.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    /// Upper bound on any single HTTP request
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 10,
            require_tls: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Service-caller authentication. Keys are stored as lowercase SHA-256 hex digests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyConfig {
    pub key_hashes: Vec<String>,
}

/// Profile job scheduling knobs
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub max_retries: i32,
    pub retry_base_delay_secs: u64,
    pub sweep_interval_secs: u64,
    pub retention_days: i64,
    /// A running job older than this is failed by the sweeper
    pub run_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_secs: 60,
            sweep_interval_secs: 30,
            retention_days: 90,
            run_timeout_secs: 1800,
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// Tool-invocation registry configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    pub disabled_tools: Vec<String>,
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub api_keys: ApiKeyConfig,
    pub scheduler: SchedulerConfig,
    pub tools: ToolConfig,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// `DATABASE_URL` is mandatory: the engine refuses to start without a real backend.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: parse_or(&lookup, "HOST", server_defaults.host)?,
            port: parse_or(&lookup, "PORT", server_defaults.port)?,
            request_timeout_secs: parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                server_defaults.request_timeout_secs,
            )?,
        };

        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let mut database = Self::parse_database_url(&database_url)?;
        database.max_pool_size = parse_or(&lookup, "DB_MAX_CONNECTIONS", database.max_pool_size)?;

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let api_keys = ApiKeyConfig {
            key_hashes: lookup("API_KEY_HASHES")
                .map(|s| split_list(&s).into_iter().map(|h| h.to_lowercase()).collect())
                .unwrap_or_default(),
        };

        let scheduler_defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            max_retries: parse_or(&lookup, "JOB_MAX_RETRIES", scheduler_defaults.max_retries)?,
            retry_base_delay_secs: parse_or(
                &lookup,
                "JOB_RETRY_BASE_DELAY_SECS",
                scheduler_defaults.retry_base_delay_secs,
            )?,
            sweep_interval_secs: parse_or(
                &lookup,
                "JOB_SWEEP_INTERVAL_SECS",
                scheduler_defaults.sweep_interval_secs,
            )?,
            retention_days: parse_or(
                &lookup,
                "JOB_RETENTION_DAYS",
                scheduler_defaults.retention_days,
            )?,
            run_timeout_secs: parse_or(
                &lookup,
                "JOB_RUN_TIMEOUT_SECS",
                scheduler_defaults.run_timeout_secs,
            )?,
        };
        if scheduler.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "JOB_SWEEP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let tools = ToolConfig {
            disabled_tools: lookup("DISABLED_TOOLS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
        };

        Ok(Self {
            server,
            database,
            cors,
            api_keys,
            scheduler,
            tools,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported DATABASE_URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::InvalidValue(
                "Missing database name in DATABASE_URL".to_string(),
            ));
        }

        let require_tls = parsed
            .query_pairs()
            .any(|(k, v)| k == "sslmode" && v == "require");

        Ok(DatabaseConfig {
            host,
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            database,
            max_pool_size: DatabaseConfig::default().max_pool_size,
            require_tls,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has invalid value '{}'", name, raw))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
