//! Configuration management for rendergate
//!
//! This module handles loading and validating configuration from environment variables,
//! files, and command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::CacheConfig;
use crate::crawler::{Classifier, CrawlerSignature};
use crate::dispatcher::{PolicyConfig, PolicyTable};
use crate::render::EngineConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Render cache configuration
    pub cache: CacheConfig,

    /// Render engine configuration
    pub engine: EngineConfig,

    /// Per-class render policy
    pub policy: PolicyConfig,

    /// Extra crawler signatures appended after the built-in table
    pub crawlers: Vec<CrawlerSignature>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port
    pub port: u16,

    /// Bind address
    pub host: String,

    /// Origin server that humans are redirected to and pages are rendered from
    pub origin: String,

    /// Attach the HTTP trace layer
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: String::from("0.0.0.0"),
            origin: String::from("http://localhost:3002"),
            enable_request_logging: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = ServerConfig::default();

        let port = match std::env::var("PORT") {
            Ok(v) => v
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {v}"))?,
            Err(_) => defaults.port,
        };

        let host = std::env::var("HOST").unwrap_or(defaults.host);
        let origin = std::env::var("TARGET_HOST").unwrap_or(defaults.origin);

        let enable_request_logging = std::env::var("REQUEST_LOGGING")
            .map(|v| !v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.enable_request_logging);

        let policy = PolicyConfig {
            default_wait_selector: std::env::var("WAIT_FOR_SELECTOR")
                .unwrap_or_else(|_| PolicyConfig::default().default_wait_selector),
            ..Default::default()
        };

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            server: ServerConfig {
                port,
                host,
                origin,
                enable_request_logging,
            },
            cache: CacheConfig::from_env(),
            engine: EngineConfig::from_env(),
            policy,
            crawlers: Vec::new(),
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let origin = url::Url::parse(&self.server.origin)
            .with_context(|| format!("origin is not a valid URL: {}", self.server.origin))?;
        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("origin must use http or https: {}", self.server.origin);
        }

        if self.engine.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be greater than 0");
        }

        if self.engine.navigation_timeout_ms == 0 {
            anyhow::bail!("navigation_timeout_ms must be greater than 0");
        }

        if self.engine.selector_timeout_ms == 0 {
            anyhow::bail!("selector_timeout_ms must be greater than 0");
        }

        if self.cache.default_ttl_secs == 0 {
            anyhow::bail!("cache default_ttl_secs must be greater than 0");
        }

        for (name, policy) in [
            ("search_engine", &self.policy.search_engine),
            ("social_media", &self.policy.social_media),
            ("other_bot", &self.policy.other_bot),
        ] {
            if policy.cache_ttl_secs == Some(0) {
                anyhow::bail!("policy.{name}.cache_ttl_secs must be greater than 0");
            }
        }

        if let Some(sig) = self.crawlers.iter().find(|s| s.token.trim().is_empty()) {
            anyhow::bail!("crawler signature '{}' has an empty token", sig.name);
        }

        Ok(())
    }

    /// Classifier with the configured extra signatures
    pub fn classifier(&self) -> Classifier {
        Classifier::with_extra(self.crawlers.iter().cloned())
    }

    /// Resolved per-class policy table
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::new(&self.policy, self.cache.default_ttl_secs)
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
