//! Configuration management for the rebac server.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rebac_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use rebac_domain::listobjects::{
    ListObjectsOptions, DEFAULT_MAX_CONCURRENT_CHECKS, DEFAULT_MAX_CONCURRENT_READS,
    DEFAULT_MAX_RESULTS,
};
use rebac_domain::resolver::{ResolverConfig, DEFAULT_CHECK_TIMEOUT, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};

/// Prefix of configuration environment variables.
const ENV_PREFIX: &str = "REBAC";

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Check resolver settings
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// ListObjects settings
    #[serde(default)]
    pub list_objects: ListObjectsSettings,
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type. Only "memory" is available.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Check resolver settings.
///
/// Environment variables: `REBAC_RESOLVER__MAX_DEPTH`,
/// `REBAC_RESOLVER__CHECK_TIMEOUT_MS`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResolverSettings {
    /// Maximum traversal depth of a single Check.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Time budget of a single Check in milliseconds.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            check_timeout_ms: default_check_timeout_ms(),
        }
    }
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_check_timeout_ms() -> u64 {
    DEFAULT_CHECK_TIMEOUT.as_millis() as u64
}

/// ListObjects settings.
///
/// These settings can be overridden via environment variables with the
/// `REBAC_` prefix and `__` as the nested key separator:
///
/// - `REBAC_LIST_OBJECTS__MAX_RESULTS=100` - Cap results (0 = unbounded)
/// - `REBAC_LIST_OBJECTS__DEADLINE_MS=5000` - Per-request time budget
/// - `REBAC_LIST_OBJECTS__HYBRID_CANDIDATES=false` - Verify every object of
///   the type instead of expanded candidates
///
/// # Example YAML Configuration
///
/// ```yaml
/// list_objects:
///   max_results: 1000
///   deadline_ms: 60000
///   max_concurrent_reads: 50
///   max_concurrent_checks: 50
///   hybrid_candidates: true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ListObjectsSettings {
    /// Result cap. 0 means unbounded.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Per-request deadline in milliseconds. 0 selects the default of one
    /// minute.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Concurrent tuple reads per reverse-expansion level.
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,

    /// Concurrent Checks while verifying candidates.
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    /// Narrow verification candidates with a relaxed reverse expansion.
    #[serde(default = "default_true")]
    pub hybrid_candidates: bool,
}

impl Default for ListObjectsSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            deadline_ms: default_deadline_ms(),
            max_concurrent_reads: default_max_concurrent_reads(),
            max_concurrent_checks: default_max_concurrent_checks(),
            hybrid_candidates: true,
        }
    }
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

fn default_deadline_ms() -> u64 {
    60_000
}

fn default_max_concurrent_reads() -> usize {
    DEFAULT_MAX_CONCURRENT_READS
}

fn default_max_concurrent_checks() -> usize {
    DEFAULT_MAX_CONCURRENT_CHECKS
}

fn default_true() -> bool {
    true
}

impl ListObjectsSettings {
    /// Converts the settings into engine options.
    pub fn to_options(&self) -> ListObjectsOptions {
        ListObjectsOptions::default()
            .with_max_results(self.max_results)
            .with_deadline(Duration::from_millis(self.deadline_ms))
            .with_max_concurrent_reads(self.max_concurrent_reads)
            .with_max_concurrent_checks(self.max_concurrent_checks)
            .with_hybrid_candidates(self.hybrid_candidates)
    }
}

impl ResolverSettings {
    /// Converts the settings into a resolver configuration.
    pub fn to_resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default()
            .with_max_depth(self.max_depth)
            .with_timeout(Duration::from_millis(self.check_timeout_ms))
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `REBAC_` and use `__` as separator.
    /// For example:
    /// - `REBAC_LOGGING__LEVEL=debug` overrides `logging.level`
    /// - `REBAC_LIST_OBJECTS__MAX_RESULTS=10` overrides `list_objects.max_results`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Uses default values and allows overrides via `REBAC_` prefixed env vars.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        if self.resolver.max_depth == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "resolver.max_depth must be greater than 0".to_string(),
            });
        }

        if self.list_objects.max_concurrent_reads == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "list_objects.max_concurrent_reads must be greater than 0".to_string(),
            });
        }

        if self.list_objects.max_concurrent_checks == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "list_objects.max_concurrent_checks must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Environment source: `REBAC_LIST_OBJECTS__MAX_RESULTS` -> `list_objects.max_results`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
