//! Redis cache backend
//!
//! Connections come from a `deadpool-redis` pool, which replaces broken
//! connections on checkout. Every logical operation is bounded by the
//! operation timeout and retried with backoff on connection-level errors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

use super::{CacheConfig, CacheStore};
use crate::utils::error::CacheError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Keys fetched per SCAN round trip and deleted per DEL
const SCAN_BATCH: usize = 500;

/// Redis-backed store
pub struct RedisStore {
    pool: Pool,
    operation_timeout: Duration,
    retry: RetryConfig,
}

impl RedisStore {
    /// Build the connection pool
    ///
    /// No connection is opened here; the first operation connects.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let url = config.redis_url()?;
        let operation_timeout = config.operation_timeout();

        let pool = PoolConfig::from_url(url)
            .builder()
            .map_err(|e| anyhow::anyhow!("Failed to create pool builder: {e}"))?
            .max_size(config.pool_size.max(1))
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(operation_timeout))
            .create_timeout(Some(operation_timeout))
            .recycle_timeout(Some(operation_timeout))
            .build()
            .context("Failed to create Redis connection pool")?;

        tracing::debug!(
            host = %config.redis_host,
            port = config.redis_port,
            pool_size = config.pool_size,
            "Redis pool created"
        );

        Ok(Self {
            pool,
            operation_timeout,
            retry: config.retry_config(),
        })
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }

    /// Run `op` on a pooled connection with timeout and reconnect backoff
    async fn with_connection<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let op = &op;
        let timeout = self.operation_timeout;
        with_retry_if(
            &self.retry,
            move || async move {
                let conn = self.connection().await?;
                match tokio::time::timeout(timeout, op(conn)).await {
                    Ok(result) => result,
                    Err(_) => Err(CacheError::Timeout(timeout)),
                }
            },
            CacheError::is_connection_level,
        )
        .await
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_connection(|mut conn| async move {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let seconds = ttl.as_secs().max(1);
        self.with_connection(|mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value, seconds).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.with_connection(|mut conn| async move {
            conn.del::<_, ()>(key).await?;
            Ok(())
        })
        .await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let pattern = scan_pattern(prefix);
        let pattern = pattern.as_str();

        self.with_connection(|mut conn| async move {
            let mut cursor: u64 = 0;
            let mut keys: Vec<String> = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut *conn)
                    .await?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }

            // SCAN may repeat keys; DEL reports what was actually removed
            let mut removed = 0u64;
            for chunk in keys.chunks(SCAN_BATCH) {
                let n: u64 = conn.del(chunk).await?;
                removed += n;
            }
            Ok(removed)
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.with_connection(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close();
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// `SCAN MATCH` pattern for every key under `prefix`, with glob
/// metacharacters in the prefix matched literally
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 2);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str(":*");
    pattern
}
