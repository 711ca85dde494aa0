//! Per-class render policy

use serde::{Deserialize, Serialize};

use crate::crawler::CrawlerClass;

/// Default wait selector for app-shell pages
pub const DEFAULT_WAIT_SELECTOR: &str = "#root";

/// Wait selector for link-preview crawlers: any Open Graph or Twitter card tag
pub const SOCIAL_META_SELECTOR: &str = r#"meta[property^="og:"], meta[name^="twitter:"]"#;

/// How a bot class is rendered and cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPolicy {
    /// Selector that must be visible before the snapshot is taken
    pub wait_selector: Option<String>,
    /// Pause after a successful render, before caching and responding
    pub extra_settle_ms: u64,
    /// TTL of the cached snapshot
    pub cache_ttl_secs: u64,
}

/// Optional per-class overrides from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    /// Empty string disables the selector wait
    pub wait_selector: Option<String>,
    pub extra_settle_ms: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
}

impl PolicyOverride {
    fn apply(&self, mut base: RenderPolicy) -> RenderPolicy {
        if let Some(selector) = &self.wait_selector {
            base.wait_selector = Some(selector.clone()).filter(|s| !s.trim().is_empty());
        }
        if let Some(settle) = self.extra_settle_ms {
            base.extra_settle_ms = settle;
        }
        if let Some(ttl) = self.cache_ttl_secs {
            base.cache_ttl_secs = ttl;
        }
        base
    }
}

/// Policy section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Selector used by search-engine and other-bot renders
    pub default_wait_selector: String,
    pub search_engine: PolicyOverride,
    pub social_media: PolicyOverride,
    pub other_bot: PolicyOverride,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_wait_selector: DEFAULT_WAIT_SELECTOR.to_string(),
            search_engine: PolicyOverride::default(),
            social_media: PolicyOverride::default(),
            other_bot: PolicyOverride::default(),
        }
    }
}

/// Resolved policy per bot class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    search_engine: RenderPolicy,
    social_media: RenderPolicy,
    other_bot: RenderPolicy,
}

impl PolicyTable {
    /// Built-in defaults with configuration overrides applied
    ///
    /// `default_ttl_secs` is the cache's default TTL, used by the other-bot class.
    pub fn new(config: &PolicyConfig, default_ttl_secs: u64) -> Self {
        let default_selector =
            Some(config.default_wait_selector.clone()).filter(|s| !s.trim().is_empty());

        let search_engine = RenderPolicy {
            wait_selector: default_selector.clone(),
            extra_settle_ms: 2_000,
            cache_ttl_secs: 3_600,
        };
        let social_media = RenderPolicy {
            wait_selector: Some(SOCIAL_META_SELECTOR.to_string()),
            extra_settle_ms: 0,
            cache_ttl_secs: 1_800,
        };
        let other_bot = RenderPolicy {
            wait_selector: default_selector,
            extra_settle_ms: 0,
            cache_ttl_secs: default_ttl_secs,
        };

        Self {
            search_engine: config.search_engine.apply(search_engine),
            social_media: config.social_media.apply(social_media),
            other_bot: config.other_bot.apply(other_bot),
        }
    }

    /// Policy for a class; humans have none
    pub fn get(&self, class: CrawlerClass) -> Option<&RenderPolicy> {
        match class {
            CrawlerClass::Human => None,
            CrawlerClass::SearchEngine => Some(&self.search_engine),
            CrawlerClass::SocialMedia => Some(&self.social_media),
            CrawlerClass::OtherBot => Some(&self.other_bot),
        }
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(&PolicyConfig::default(), 600)
    }
}
