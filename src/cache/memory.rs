//! In-process cache backend
//!
//! An expired entry is dropped the next time it is read. Writes also sweep
//! the whole map once it has doubled since the last sweep, so keys that are
//! never read again do not accumulate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::CacheStore;
use crate::utils::error::CacheError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Smallest map size that triggers a sweep
const MIN_SWEEP_AT: usize = 64;

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_AT,
        }
    }
}

impl Entries {
    fn insert(&mut self, key: String, entry: Entry) {
        self.map.insert(key, entry);
        if self.map.len() >= self.sweep_at {
            let now = Instant::now();
            self.map.retain(|_, e| e.is_live(now));
            self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_AT);
        }
    }
}

/// TTL-aware map guarded by an async RwLock
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of a live entry
    pub async fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .map
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .map
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    async fn held(&self) -> usize {
        self.entries.read().await.map.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it unless it was refreshed meanwhile
        let mut entries = self.entries.write().await;
        if entries.map.get(key).is_some_and(|e| !e.is_live(Instant::now())) {
            entries.map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.map.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let namespace = format!("{prefix}:");
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        entries.map.retain(|key, entry| {
            if key.starts_with(&namespace) {
                if entry.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) {
        *self.entries.write().await = Entries::default();
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
