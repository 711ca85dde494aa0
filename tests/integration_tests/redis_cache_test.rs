//! Render cache tests against a live Redis
//!
//! Run with `cargo test -- --ignored` and Redis on localhost:6379.

use rendergate::cache::{CacheBackend, CacheConfig, RenderCache};
use rendergate::crawler::CrawlerClass;

fn redis_config(prefix: &str) -> CacheConfig {
    CacheConfig {
        enabled: true,
        backend: CacheBackend::Redis,
        key_prefix: prefix.to_string(),
        ..CacheConfig::from_env()
    }
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_redis_round_trip() {
    let cache = RenderCache::from_config(&redis_config("rendergate-it-roundtrip")).await;
    assert!(cache.health_check().await);

    let key = cache.key("/products/42", CrawlerClass::SearchEngine);
    cache.set(&key, "<html>42</html>", 60).await;
    assert_eq!(cache.get(&key).await.as_deref(), Some("<html>42</html>"));

    cache.delete(&key).await;
    assert_eq!(cache.get(&key).await, None);
    cache.close().await;
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_redis_clear_all_only_touches_prefix() {
    let ours = RenderCache::from_config(&redis_config("rendergate-it-clear")).await;
    let theirs = RenderCache::from_config(&redis_config("rendergate-it-other")).await;

    for path in ["/a", "/b", "/c?x=1"] {
        ours.set(&ours.key(path, CrawlerClass::SearchEngine), "x", 60).await;
    }
    let kept = theirs.key("/a", CrawlerClass::SearchEngine);
    theirs.set(&kept, "y", 60).await;

    assert_eq!(ours.clear_all().await, 3);
    assert_eq!(theirs.get(&kept).await.as_deref(), Some("y"));

    theirs.clear_all().await;
}

#[tokio::test]
#[ignore = "Requires running Redis"]
async fn test_redis_entry_expires() {
    let cache = RenderCache::from_config(&redis_config("rendergate-it-expiry")).await;
    let key = cache.key("/ttl", CrawlerClass::SocialMedia);

    cache.set(&key, "soon gone", 1).await;
    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;

    assert_eq!(cache.get(&key).await, None);
}

#[tokio::test]
async fn test_unreachable_redis_degrades_to_miss() {
    let config = CacheConfig {
        enabled: true,
        backend: CacheBackend::Redis,
        redis_host: "127.0.0.1".to_string(),
        redis_port: 1,
        operation_timeout_ms: 100,
        max_retries: 1,
        ..Default::default()
    };
    let cache = RenderCache::from_config(&config).await;
    assert!(cache.is_enabled());

    let key = cache.key("/down", CrawlerClass::SearchEngine);
    cache.set(&key, "<html></html>", 60).await;
    assert_eq!(cache.get(&key).await, None);
    assert_eq!(cache.clear_all().await, 0);
    assert!(!cache.health_check().await);
}
