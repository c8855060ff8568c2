//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/bde";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 25;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default records per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default maximum upload size in bytes (500 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// Default directory for staged upload files.
pub const DEFAULT_UPLOAD_DIR: &str = "./data/uploads";

/// Default cap on foreign-key cache entries; beyond this the cache is left
/// empty and FK validation is deferred to database constraints.
pub const DEFAULT_MAX_FK_CACHE_SIZE: usize = 100_000;

/// Default number of buffered validation errors before a flush to storage.
pub const DEFAULT_ERROR_FLUSH_THRESHOLD: usize = 1000;

/// Default scheduler poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default row interval between cooperative cancellation checks.
pub const DEFAULT_CANCEL_CHECKPOINT_ROWS: u64 = 10_000;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub scheduler: SchedulerConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Records per bulk insert.
    pub batch_size: usize,
    /// Maximum accepted upload size in bytes.
    pub max_upload_size: u64,
    /// Directory where uploads are staged before processing.
    pub upload_dir: PathBuf,
    /// FK caches larger than this are skipped entirely.
    pub max_fk_cache_size: usize,
    /// Buffered validation errors before a flush to storage.
    pub error_flush_threshold: usize,
    /// Rows between cooperative cancellation checks.
    pub cancel_checkpoint_rows: u64,
}

/// Background job scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between pending-job scans.
    pub poll_interval_secs: u64,
    /// Maximum concurrently running pipelines.
    pub worker_cap: usize,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Worker cap for I/O-bound pipelines: most time is spent waiting on the
/// database or disk, so more workers than cores pays off, bounded to keep
/// the connection pool sane.
pub fn default_worker_cap() -> usize {
    (num_cpus::get() * 4).clamp(4, 32)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("BDE_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("BDE_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("BDE_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            import: ImportConfig {
                batch_size: std::env::var("IMPORT_BATCH_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BATCH_SIZE),
                max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE),
                upload_dir: std::env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
                max_fk_cache_size: std::env::var("MAX_FK_CACHE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_FK_CACHE_SIZE),
                error_flush_threshold: std::env::var("ERROR_FLUSH_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_ERROR_FLUSH_THRESHOLD),
                cancel_checkpoint_rows: std::env::var("CANCEL_CHECKPOINT_ROWS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_CANCEL_CHECKPOINT_ROWS),
            },
            scheduler: SchedulerConfig {
                poll_interval_secs: std::env::var("SCHEDULER_POLL_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                worker_cap: std::env::var("WORKER_CAP")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_worker_cap),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                allow_credentials: std::env::var("CORS_ALLOW_CREDENTIALS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.import.batch_size == 0 {
            anyhow::bail!("Import batch_size must be greater than 0");
        }

        if self.import.error_flush_threshold == 0 {
            anyhow::bail!("Import error_flush_threshold must be greater than 0");
        }

        if self.import.cancel_checkpoint_rows == 0 {
            anyhow::bail!("Import cancel_checkpoint_rows must be greater than 0");
        }

        if self.scheduler.worker_cap == 0 {
            anyhow::bail!("Scheduler worker_cap must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            import: ImportConfig::default(),
            scheduler: SchedulerConfig {
                poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
                worker_cap: default_worker_cap(),
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_fk_cache_size: DEFAULT_MAX_FK_CACHE_SIZE,
            error_flush_threshold: DEFAULT_ERROR_FLUSH_THRESHOLD,
            cancel_checkpoint_rows: DEFAULT_CANCEL_CHECKPOINT_ROWS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn worker_cap_stays_in_bounds() {
        let cap = default_worker_cap();
        assert!((4..=32).contains(&cap));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = Config::default();
        config.import.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_pool_bounds_are_rejected() {
        let mut config = Config::default();
        config.database.min_connections = 50;
        config.database.max_connections = 10;
        assert!(config.validate().is_err());
    }
}
