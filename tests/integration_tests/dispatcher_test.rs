//! Dispatcher integration tests
//!
//! Exercises the full decision path with an in-process cache and a scripted
//! renderer:
//! 1. Search-engine render, cache store and metadata
//! 2. Cache hits bypass the renderer
//! 3. Render failures degrade to the human redirect
//! 4. Humans never touch cache or renderer

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rendergate::cache::{CacheConfig, CacheStore, MemoryStore, RenderCache};
use rendergate::crawler::{CrawlerClass, CrawlerSignature};
use rendergate::dispatcher::{DispatchOutcome, PassThroughReason};
use rendergate::utils::error::CacheError;

use super::fixtures::{PRODUCT_PAGE_HTML, SHARE_PAGE_HTML};
use crate::common::{
    dispatcher, memory_cache, test_config, Script, ScriptedRenderer, CHROME_UA, FACEBOOK_UA,
    GOOGLEBOT_UA,
};

/// Store wrapper that counts every call
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_prefix(prefix).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) {}

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

// ============================================================================
// Render Path
// ============================================================================

#[tokio::test]
async fn test_search_engine_render_is_cached_with_class_ttl() {
    let config = test_config();
    let (cache, store) = memory_cache(&config.cache);
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    let outcome = dispatcher.dispatch("/products/42", GOOGLEBOT_UA).await;

    match outcome {
        DispatchOutcome::Rendered {
            html,
            class,
            cache_ttl_secs,
            ..
        } => {
            assert_eq!(html, PRODUCT_PAGE_HTML);
            assert_eq!(class, CrawlerClass::SearchEngine);
            assert_eq!(cache_ttl_secs, 3600);
        }
        other => panic!("expected a render, got {other:?}"),
    }

    assert_eq!(
        renderer.calls(),
        vec![(
            "http://localhost:3002/products/42".to_string(),
            Some("#root".to_string())
        )]
    );

    let key = "dynamic-render:/products/42:se";
    assert_eq!(store.get(key).await.unwrap().as_deref(), Some(PRODUCT_PAGE_HTML));
    let ttl = store.ttl_of(key).await.expect("entry should be live");
    assert!(ttl > Duration::from_secs(3590) && ttl <= Duration::from_secs(3600));
}

#[tokio::test]
async fn test_second_request_within_ttl_served_from_cache() {
    let config = test_config();
    let (cache, _store) = memory_cache(&config.cache);
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    dispatcher.dispatch("/products/42", GOOGLEBOT_UA).await;
    let second = dispatcher.dispatch("/products/42", GOOGLEBOT_UA).await;

    assert_eq!(
        second,
        DispatchOutcome::Cached {
            html: PRODUCT_PAGE_HTML.to_string(),
            class: CrawlerClass::SearchEngine,
        }
    );
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_classes_are_cached_separately() {
    let config = test_config();
    let (cache, store) = memory_cache(&config.cache);
    let renderer = Arc::new(ScriptedRenderer::html(SHARE_PAGE_HTML));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    dispatcher.dispatch("/posts/7", GOOGLEBOT_UA).await;
    let social = dispatcher.dispatch("/posts/7", FACEBOOK_UA).await;

    assert!(matches!(
        social,
        DispatchOutcome::Rendered {
            class: CrawlerClass::SocialMedia,
            cache_ttl_secs: 1800,
            ..
        }
    ));
    assert_eq!(renderer.call_count(), 2);
    assert_eq!(store.len().await, 2);
    assert_eq!(
        renderer.calls()[1].1.as_deref(),
        Some(r#"meta[property^="og:"], meta[name^="twitter:"]"#)
    );
}

#[tokio::test]
async fn test_disabled_cache_renders_every_time() {
    let mut config = test_config();
    config.cache.enabled = false;
    let cache = RenderCache::disabled(&config.cache);
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    for _ in 0..3 {
        let outcome = dispatcher.dispatch("/products/42", GOOGLEBOT_UA).await;
        assert!(matches!(outcome, DispatchOutcome::Rendered { .. }));
    }
    assert_eq!(renderer.call_count(), 3);
}

#[tokio::test]
async fn test_configured_crawler_uses_other_bot_policy() {
    let mut config = test_config();
    config.crawlers.push(CrawlerSignature::new(
        "ahrefsbot",
        "Ahrefs",
        CrawlerClass::OtherBot,
    ));
    let (cache, store) = memory_cache(&config.cache);
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    let outcome = dispatcher
        .dispatch("/", "Mozilla/5.0 (compatible; AhrefsBot/7.0; +http://ahrefs.com/robot/)")
        .await;

    assert!(matches!(
        outcome,
        DispatchOutcome::Rendered {
            class: CrawlerClass::OtherBot,
            cache_ttl_secs: 600,
            ..
        }
    ));
    assert!(store.get("dynamic-render:/:bot").await.unwrap().is_some());
}

#[tokio::test]
async fn test_render_survives_dropped_request() {
    let config = test_config();
    let (cache, store) = memory_cache(&config.cache);
    let renderer = Arc::new(
        ScriptedRenderer::html(PRODUCT_PAGE_HTML).with_delay(Duration::from_millis(100)),
    );
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    // The client goes away long before the render finishes
    let dropped = tokio::time::timeout(
        Duration::from_millis(10),
        dispatcher.dispatch("/products/42", GOOGLEBOT_UA),
    )
    .await;
    assert!(dropped.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(store
        .get("dynamic-render:/products/42:se")
        .await
        .unwrap()
        .is_some());
}

// ============================================================================
// Fallback Path
// ============================================================================

#[tokio::test]
async fn test_social_media_navigation_error_redirects() {
    let config = test_config();
    let (cache, store) = memory_cache(&config.cache);
    let renderer = Arc::new(ScriptedRenderer::new(Script::NavigationError));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    let outcome = dispatcher.dispatch("/share/9?ref=fb", FACEBOOK_UA).await;

    assert_eq!(
        outcome,
        DispatchOutcome::PassThrough {
            location: "http://localhost:3002/share/9?ref=fb".to_string(),
            reason: PassThroughReason::RenderFailed("navigation"),
        }
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_failure_fallback_equals_human_pass_through() {
    let config = test_config();
    let (cache, _) = memory_cache(&config.cache);
    let failing = dispatcher(
        &config,
        cache,
        Arc::new(ScriptedRenderer::new(Script::SelectorTimeout)),
    );
    let (cache, _) = memory_cache(&config.cache);
    let healthy = dispatcher(&config, cache, Arc::new(ScriptedRenderer::html("")));

    let fallback = failing.dispatch("/a/b?c=d", GOOGLEBOT_UA).await;
    let human = healthy.dispatch("/a/b?c=d", CHROME_UA).await;

    match (fallback, human) {
        (
            DispatchOutcome::PassThrough { location: a, reason: PassThroughReason::RenderFailed("timeout") },
            DispatchOutcome::PassThrough { location: b, reason: PassThroughReason::Human },
        ) => assert_eq!(a, b),
        other => panic!("expected two pass-throughs, got {other:?}"),
    }
}

#[tokio::test]
async fn test_human_never_touches_cache_or_renderer() {
    let config = test_config();
    let store = Arc::new(CountingStore::default());
    let cache = RenderCache::with_store(store.clone(), &CacheConfig { enabled: true, ..config.cache.clone() });
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let dispatcher = dispatcher(&config, cache, renderer.clone());

    for ua in [CHROME_UA, "", "curl-like but not a crawler"] {
        let outcome = dispatcher.dispatch("/products/42", ua).await;
        assert!(outcome.is_pass_through());
    }

    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.call_count(), 0);
}
