//! Request dispatcher
//!
//! Decides, per request, between passing a human through to the origin and
//! serving a bot a rendered snapshot:
//!
//! 1. Classify the User-Agent
//! 2. Humans get a redirect to `<origin><path+query>`
//! 3. Bots get the cached snapshot for `(path, class)` if one exists,
//!    otherwise a fresh render that is then cached under the class TTL
//! 4. Any render failure degrades to the same redirect humans get
//!
//! The dispatcher returns a [`DispatchOutcome`]; turning it into an HTTP
//! response is the server's job.

pub mod policy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::RenderCache;
use crate::crawler::{Classifier, CrawlerClass};
use crate::metrics;
use crate::render::{RenderResult, Renderer};
use crate::utils::error::RenderError;
use crate::utils::join_origin;

pub use self::policy::{PolicyConfig, PolicyOverride, PolicyTable, RenderPolicy};

/// Why a request was passed through to the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// The client was classified as a human browser
    Human,
    /// Rendering failed with the given error kind
    RenderFailed(&'static str),
}

impl PassThroughReason {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::RenderFailed(kind) => kind,
        }
    }
}

/// Result of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Redirect the client to the origin
    PassThrough {
        location: String,
        reason: PassThroughReason,
    },
    /// Snapshot served from the cache, verbatim
    Cached { html: String, class: CrawlerClass },
    /// Snapshot produced by a render on this request
    Rendered {
        html: String,
        class: CrawlerClass,
        render_duration_ms: u64,
        cache_ttl_secs: u64,
    },
}

impl DispatchOutcome {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough { .. })
    }

    /// Crawler class for snapshot outcomes
    pub fn class(&self) -> Option<CrawlerClass> {
        match self {
            Self::PassThrough { .. } => None,
            Self::Cached { class, .. } | Self::Rendered { class, .. } => Some(*class),
        }
    }
}

/// Routes requests between the origin redirect and the render path
#[derive(Clone)]
pub struct Dispatcher {
    origin: Arc<str>,
    classifier: Arc<Classifier>,
    policies: Arc<PolicyTable>,
    cache: RenderCache,
    renderer: Arc<dyn Renderer>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("origin", &self.origin)
            .field("policies", &self.policies)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        origin: &str,
        classifier: Classifier,
        policies: PolicyTable,
        cache: RenderCache,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            origin: Arc::from(origin.trim_end_matches('/')),
            classifier: Arc::new(classifier),
            policies: Arc::new(policies),
            cache,
            renderer,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Dispatch a request for `path_and_query` from `user_agent`
    pub async fn dispatch(&self, path_and_query: &str, user_agent: &str) -> DispatchOutcome {
        let signature = self.classifier.detect(user_agent);
        let class = signature.map_or(CrawlerClass::Human, |sig| sig.class);
        let Some(policy) = self.policies.get(class) else {
            return self.pass_through(path_and_query, PassThroughReason::Human);
        };
        let crawler = signature.map_or("unknown", |sig| &*sig.name);

        let key = self.cache.key(path_and_query, class);
        if let Some(html) = self.cache.get(&key).await {
            tracing::info!(path = %path_and_query, crawler = %crawler, class = %class, "Serving cached snapshot");
            return DispatchOutcome::Cached { html, class };
        }

        let url = join_origin(&self.origin, path_and_query);
        tracing::info!(url = %url, crawler = %crawler, class = %class, "Rendering for crawler");

        // Detached so a client disconnect does not abort the render or the cache write
        let task = tokio::spawn(render_and_store(
            Arc::clone(&self.renderer),
            self.cache.clone(),
            policy.clone(),
            url.clone(),
            key,
            class,
        ));

        match task.await {
            Ok(Ok(result)) => DispatchOutcome::Rendered {
                html: result.html,
                class,
                render_duration_ms: result.render_duration_ms,
                cache_ttl_secs: policy.cache_ttl_secs,
            },
            Ok(Err(e)) => {
                tracing::warn!(
                    url = %url,
                    crawler = %crawler,
                    kind = e.kind(),
                    error = %e,
                    "Render failed, passing through to origin"
                );
                self.pass_through(path_and_query, PassThroughReason::RenderFailed(e.kind()))
            }
            Err(e) => {
                tracing::error!(
                    url = %url,
                    crawler = %crawler,
                    kind = "panic",
                    error = %e,
                    "Render task aborted, passing through to origin"
                );
                self.pass_through(path_and_query, PassThroughReason::RenderFailed("panic"))
            }
        }
    }

    /// Redirect target for a request
    pub fn pass_through(&self, path_and_query: &str, reason: PassThroughReason) -> DispatchOutcome {
        metrics::record_pass_through(reason.as_str());
        DispatchOutcome::PassThrough {
            location: join_origin(&self.origin, path_and_query),
            reason,
        }
    }
}

async fn render_and_store(
    renderer: Arc<dyn Renderer>,
    cache: RenderCache,
    policy: RenderPolicy,
    url: String,
    key: String,
    class: CrawlerClass,
) -> Result<RenderResult, RenderError> {
    let started = Instant::now();
    let result = renderer.render(&url, policy.wait_selector.as_deref()).await;

    let label = class.cache_tag();
    let result = match result {
        Ok(result) => {
            metrics::record_render(label, "ok", started.elapsed().as_secs_f64());
            result
        }
        Err(e) => {
            metrics::record_render(label, e.kind(), started.elapsed().as_secs_f64());
            return Err(e);
        }
    };

    if policy.extra_settle_ms > 0 {
        tokio::time::sleep(Duration::from_millis(policy.extra_settle_ms)).await;
    }

    cache.set(&key, &result.html, policy.cache_ttl_secs).await;
    tracing::debug!(
        url = %url,
        duration_ms = result.render_duration_ms,
        bytes = result.html.len(),
        "Render complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        calls: AtomicUsize,
        selectors: Mutex<Vec<Option<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Renderer for RecordingRenderer {
        async fn render(
            &self,
            url: &str,
            wait_selector: Option<&str>,
        ) -> Result<RenderResult, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.selectors
                .lock()
                .unwrap()
                .push(wait_selector.map(str::to_string));
            if self.fail {
                return Err(RenderError::Navigation("net::ERR_CONNECTION_REFUSED".into()));
            }
            Ok(RenderResult {
                html: format!("<html><body>{url}</body></html>"),
                render_duration_ms: 42,
            })
        }

        fn max_concurrent(&self) -> usize {
            1
        }
    }

    fn dispatcher(renderer: Arc<RecordingRenderer>) -> Dispatcher {
        let config = CacheConfig {
            enabled: true,
            ..Default::default()
        };
        let cache = RenderCache::with_store(Arc::new(MemoryStore::new()), &config);
        let policies = PolicyTable::new(
            &PolicyConfig {
                search_engine: PolicyOverride {
                    extra_settle_ms: Some(0),
                    ..Default::default()
                },
                ..Default::default()
            },
            config.default_ttl_secs,
        );
        Dispatcher::new(
            "http://origin:3002/",
            Classifier::default(),
            policies,
            cache,
            renderer,
        )
    }

    #[tokio::test]
    async fn test_human_is_redirected() {
        let renderer = Arc::new(RecordingRenderer::default());
        let dispatcher = dispatcher(Arc::clone(&renderer));

        let outcome = dispatcher.dispatch("/cart?id=1", "Mozilla/5.0 (X11; Linux x86_64)").await;

        assert_eq!(
            outcome,
            DispatchOutcome::PassThrough {
                location: "http://origin:3002/cart?id=1".to_string(),
                reason: PassThroughReason::Human,
            }
        );
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_render_then_cache_hit() {
        let renderer = Arc::new(RecordingRenderer::default());
        let dispatcher = dispatcher(Arc::clone(&renderer));

        let first = dispatcher.dispatch("/p", "Googlebot/2.1").await;
        assert!(matches!(first, DispatchOutcome::Rendered { cache_ttl_secs: 3600, .. }));

        let second = dispatcher.dispatch("/p", "Googlebot/2.1").await;
        assert!(matches!(second, DispatchOutcome::Cached { class: CrawlerClass::SearchEngine, .. }));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_failure_matches_pass_through() {
        let renderer = Arc::new(RecordingRenderer {
            fail: true,
            ..Default::default()
        });
        let dispatcher = dispatcher(Arc::clone(&renderer));

        let outcome = dispatcher.dispatch("/share/9", "Twitterbot/1.0").await;

        match outcome {
            DispatchOutcome::PassThrough { location, reason } => {
                assert_eq!(location, "http://origin:3002/share/9");
                assert_eq!(reason, PassThroughReason::RenderFailed("navigation"));
            }
            other => panic!("expected pass-through, got {other:?}"),
        }
        let key = dispatcher.cache().key("/share/9", CrawlerClass::SocialMedia);
        assert_eq!(dispatcher.cache().get(&key).await, None);
    }

    #[tokio::test]
    async fn test_social_media_uses_meta_selector() {
        let renderer = Arc::new(RecordingRenderer::default());
        let dispatcher = dispatcher(Arc::clone(&renderer));

        dispatcher.dispatch("/", "facebookexternalhit/1.1").await;

        let selectors = renderer.selectors.lock().unwrap();
        assert_eq!(
            selectors[0].as_deref(),
            Some(r#"meta[property^="og:"], meta[name^="twitter:"]"#)
        );
    }
}
