//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rendergate::cache::{CacheBackend, CacheConfig, MemoryStore, RenderCache};
use rendergate::config::Config;
use rendergate::dispatcher::Dispatcher;
use rendergate::error::RenderError;
use rendergate::render::{RenderResult, Renderer};

pub const ORIGIN: &str = "http://localhost:3002";

pub const GOOGLEBOT_UA: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
pub const FACEBOOK_UA: &str =
    "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)";
pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// What the scripted renderer does on every call
#[derive(Debug, Clone)]
pub enum Script {
    Html(String),
    NavigationError,
    SelectorTimeout,
}

/// Renderer that records its calls and answers from a script
pub struct ScriptedRenderer {
    script: Script,
    delay: Duration,
    calls: Mutex<Vec<(String, Option<String>)>>,
    count: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn html(html: &str) -> Self {
        Self::new(Script::Html(html.to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(
        &self,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<RenderResult, RenderError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), wait_selector.map(str::to_string)));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.script {
            Script::Html(html) => Ok(RenderResult {
                html: html.clone(),
                render_duration_ms: self.delay.as_millis() as u64 + 250,
            }),
            Script::NavigationError => Err(RenderError::Navigation(
                "net::ERR_CONNECTION_REFUSED".to_string(),
            )),
            Script::SelectorTimeout => Err(RenderError::Timeout {
                stage: rendergate::error::TimeoutStage::Selector,
                elapsed: Duration::from_secs(5),
            }),
        }
    }

    fn max_concurrent(&self) -> usize {
        10
    }
}

/// Config with an enabled in-process cache and no settle delay
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.origin = ORIGIN.to_string();
    config.cache = CacheConfig {
        enabled: true,
        backend: CacheBackend::Memory,
        ..Default::default()
    };
    config.policy.search_engine.extra_settle_ms = Some(0);
    config
}

/// Memory-backed cache plus a handle to its store
pub fn memory_cache(config: &CacheConfig) -> (RenderCache, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (RenderCache::with_store(store.clone(), config), store)
}

pub fn dispatcher(config: &Config, cache: RenderCache, renderer: Arc<ScriptedRenderer>) -> Dispatcher {
    Dispatcher::new(
        &config.server.origin,
        config.classifier(),
        config.policy_table(),
        cache,
        renderer,
    )
}
