//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! star-tally service, including environment variable loading, TOML file
//! loading and validation.

use crate::config::rating::AttributeSettings;
use crate::rating::StaticAttributeRegistry;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Upper bound of the session idle timeout (30 days)
pub const MAX_SESSION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub ratings: RatingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and health reports
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host the HTTP server binds to
    pub http_host: String,
    /// Port of the HTTP server (votes, ratings, health, metrics)
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Maximum requests handled concurrently
    pub max_concurrent_operations: usize,
    /// Request header carrying the voter's session id
    pub session_header: String,
    /// Sessions idle for longer than this are forgotten, with their vote locks
    pub session_ttl_seconds: u64,
}

/// Rating attributes served by this instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingSettings {
    #[serde(default)]
    pub attributes: Vec<AttributeSettings>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "star-tally".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
            max_concurrent_operations: 1000,
            session_header: "x-session-id".to_string(),
            session_ttl_seconds: 3600,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;

        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.http_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(max_ops) = env::var("MAX_CONCURRENT_OPERATIONS") {
            self.service.max_concurrent_operations = max_ops
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_CONCURRENT_OPERATIONS value: {}", max_ops))?;
        }
        if let Ok(header) = env::var("SESSION_HEADER") {
            self.service.session_header = header;
        }
        if let Ok(ttl) = env::var("SESSION_TTL_SECONDS") {
            self.service.session_ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid SESSION_TTL_SECONDS value: {}", ttl))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get session idle timeout as a chrono Duration
    pub fn session_ttl(&self) -> chrono::Duration {
        let seconds = self.service.session_ttl_seconds.min(MAX_SESSION_TTL_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }

    /// Build the attribute registry from the configured attributes
    pub fn attribute_registry(&self) -> Result<StaticAttributeRegistry> {
        StaticAttributeRegistry::from_settings(&self.ratings.attributes)
            .map_err(|e| anyhow!("Invalid rating attributes: {}", e))
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.max_concurrent_operations == 0 {
        return Err(anyhow!("Max concurrent operations must be greater than 0"));
    }
    if config.service.session_header.is_empty() {
        return Err(anyhow!("Session header name cannot be empty"));
    }
    if config.service.session_ttl_seconds == 0
        || config.service.session_ttl_seconds > MAX_SESSION_TTL_SECONDS
    {
        return Err(anyhow!(
            "Session TTL must be between 1 and {} seconds",
            MAX_SESSION_TTL_SECONDS
        ));
    }

    // Scales and duplicates are checked by building the registry once
    config.attribute_registry()?;

    Ok(())
}
