//! Render cache for HTML snapshots
//!
//! This module provides the cache façade used by the dispatcher:
//! - Snapshots are stored under `<prefix>:<path+query>:<class tag>` with a TTL
//! - A disabled cache answers every call trivially (miss / no-op)
//! - Backing-store failures are logged and degrade to a miss / no-op, so the
//!   cache never becomes a hard dependency of the request path
//!
//! Two backends exist: Redis through a `deadpool-redis` pool, and an
//! in-process map for single-node deployments and tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use rendergate::cache::{CacheConfig, RenderCache};
//! use rendergate::crawler::CrawlerClass;
//!
//! let cache = RenderCache::from_config(&CacheConfig::from_env()).await;
//! let key = cache.key("/products/42", CrawlerClass::SearchEngine);
//! cache.set(&key, "<html>...</html>", 3600).await;
//! let cached = cache.get(&key).await;
//! ```

pub mod memory;
pub mod redis_store;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::crawler::CrawlerClass;
use crate::metrics;
use crate::utils::error::CacheError;
use crate::utils::retry::RetryConfig;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Default namespace for cache keys
pub const DEFAULT_KEY_PREFIX: &str = "dynamic-render";

/// Which store backs the render cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown cache backend: {other}"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Administrative switch; when false every operation is a no-op
    pub enabled: bool,

    /// Backing store
    pub backend: CacheBackend,

    /// TTL used when a caller passes no TTL (default: 10 minutes)
    pub default_ttl_secs: u64,

    /// Key prefix for namespacing
    pub key_prefix: String,

    /// Redis host
    pub redis_host: String,

    /// Redis port
    pub redis_port: u16,

    /// Redis password (optional)
    pub redis_password: Option<String>,

    /// Connection pool size
    pub pool_size: usize,

    /// Upper bound for a single store round-trip, including connection setup
    pub operation_timeout_ms: u64,

    /// Reconnect attempts per logical operation
    pub max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: CacheBackend::Redis,
            default_ttl_secs: 600,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: None,
            pool_size: 16,
            operation_timeout_ms: 1_000,
            max_retries: 3,
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("CACHE_ENABLED")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enabled),
            backend: std::env::var("CACHE_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backend),
            default_ttl_secs: std::env::var("CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_ttl_secs),
            key_prefix: std::env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            redis_host: std::env::var("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.redis_port),
            redis_password: std::env::var("REDIS_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty()),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
            operation_timeout_ms: defaults.operation_timeout_ms,
            max_retries: defaults.max_retries,
        }
    }

    /// Connection URL for the Redis backend
    pub fn redis_url(&self) -> Result<String> {
        let mut url = url::Url::parse(&format!("redis://{}:{}", self.redis_host, self.redis_port))
            .with_context(|| format!("Invalid Redis address {}:{}", self.redis_host, self.redis_port))?;
        if let Some(password) = &self.redis_password {
            url.set_password(Some(password))
                .map_err(|_| anyhow::anyhow!("Cannot set password on Redis URL"))?;
        }
        Ok(url.to_string())
    }

    /// Per-operation bound as Duration
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Reconnect policy: 50ms base, doubling, capped at 2s
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(self.max_retries, 50, 2_000)
    }
}

/// Build the cache key for a request path and crawler class
///
/// Identical `(path, class)` pairs always produce the same key; distinct
/// classes produce distinct keys for the same path.
pub fn cache_key(prefix: &str, path_and_query: &str, class: CrawlerClass) -> String {
    format!("{prefix}:{path_and_query}:{}", class.cache_tag())
}

/// Key/value store behind the render cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;

    /// Store a value with a TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> std::result::Result<(), CacheError>;

    /// Remove a value
    async fn delete(&self, key: &str) -> std::result::Result<(), CacheError>;

    /// Remove every key starting with `prefix:`; returns the number removed
    async fn clear_prefix(&self, prefix: &str) -> std::result::Result<u64, CacheError>;

    /// Round-trip check
    async fn ping(&self) -> std::result::Result<(), CacheError>;

    /// Release connections
    async fn close(&self);

    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// Cache façade that gracefully handles disablement and store failures
#[derive(Clone)]
pub struct RenderCache {
    inner: Option<Arc<dyn CacheStore>>,
    key_prefix: String,
    default_ttl_secs: u64,
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("backend", &self.inner.as_ref().map(|s| s.backend_name()))
            .field("key_prefix", &self.key_prefix)
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish()
    }
}

impl RenderCache {
    /// A cache on which every operation is a no-op
    pub fn disabled(config: &CacheConfig) -> Self {
        Self {
            inner: None,
            key_prefix: config.key_prefix.clone(),
            default_ttl_secs: config.default_ttl_secs,
        }
    }

    /// Wrap an explicit store
    pub fn with_store(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            inner: Some(store),
            key_prefix: config.key_prefix.clone(),
            default_ttl_secs: config.default_ttl_secs,
        }
    }

    /// Create from config
    ///
    /// An unreachable Redis at startup is logged and tolerated: the pool
    /// connects lazily, so the cache starts working once Redis is up.
    pub async fn from_config(config: &CacheConfig) -> Self {
        if !config.enabled {
            tracing::info!("Render cache disabled");
            return Self::disabled(config);
        }

        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Memory => Arc::new(MemoryStore::new()),
            CacheBackend::Redis => match RedisStore::new(config) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!(error = %e, "Invalid Redis configuration, continuing without cache");
                    return Self::disabled(config);
                }
            },
        };

        match store.ping().await {
            Ok(()) => tracing::info!(backend = store.backend_name(), "Render cache connected"),
            Err(e) => tracing::warn!(
                backend = store.backend_name(),
                error = %e,
                "Render cache unreachable at startup, will keep retrying per request"
            ),
        }

        Self::with_store(store, config)
    }

    /// Check if a backing store is attached
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Namespace prefix
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Cache key for a request path and crawler class
    pub fn key(&self, path_and_query: &str, class: CrawlerClass) -> String {
        cache_key(&self.key_prefix, path_and_query, class)
    }

    /// Get a cached snapshot; store errors are reported as a miss
    pub async fn get(&self, key: &str) -> Option<String> {
        let store = self.inner.as_ref()?;
        match store.get(key).await {
            Ok(Some(value)) => {
                metrics::record_cache_lookup("hit");
                Some(value)
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                None
            }
            Err(e) => {
                metrics::record_cache_lookup("error");
                tracing::warn!(key = %key, error = %e, "Cache get failed, treating as miss");
                None
            }
        }
    }

    /// Store a snapshot; `ttl_secs == 0` means the configured default TTL
    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        let Some(store) = &self.inner else {
            return;
        };
        let ttl = if ttl_secs == 0 {
            self.default_ttl_secs
        } else {
            ttl_secs
        };
        match store.set(key, value, Duration::from_secs(ttl)).await {
            Ok(()) => tracing::debug!(key = %key, ttl_secs = ttl, "Cached snapshot"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache set failed"),
        }
    }

    /// Remove a snapshot
    pub async fn delete(&self, key: &str) {
        let Some(store) = &self.inner else {
            return;
        };
        match store.delete(key).await {
            Ok(()) => tracing::debug!(key = %key, "Deleted cache entry"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache delete failed"),
        }
    }

    /// Remove every snapshot under the namespace prefix
    pub async fn clear_all(&self) -> u64 {
        let Some(store) = &self.inner else {
            return 0;
        };
        match store.clear_prefix(&self.key_prefix).await {
            Ok(count) => {
                tracing::info!(prefix = %self.key_prefix, count = count, "Cleared cache entries");
                count
            }
            Err(e) => {
                tracing::warn!(prefix = %self.key_prefix, error = %e, "Cache clear failed");
                0
            }
        }
    }

    /// Check if the backing store answers
    pub async fn health_check(&self) -> bool {
        match &self.inner {
            Some(store) => store.ping().await.is_ok(),
            None => false,
        }
    }

    /// Backend name, `None` when disabled
    pub fn backend_name(&self) -> Option<&'static str> {
        self.inner.as_ref().map(|s| s.backend_name())
    }

    /// Close the store connection
    pub async fn close(&self) {
        if let Some(store) = &self.inner {
            store.close().await;
            tracing::info!(backend = store.backend_name(), "Render cache closed");
        }
    }
}
