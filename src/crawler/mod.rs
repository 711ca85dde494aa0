//! Crawler detection from User-Agent strings
//!
//! Every request is classified into a [`CrawlerClass`] by a case-insensitive
//! substring match against an ordered signature table. The first matching
//! token wins, so table order is the tie-break policy. Strings matching no
//! token are treated as [`CrawlerClass::Human`].
//!
//! # Example
//!
//! ```
//! use rendergate::crawler::{classify, CrawlerClass};
//!
//! let ua = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
//! assert_eq!(classify(ua), CrawlerClass::SearchEngine);
//! assert_eq!(classify("Mozilla/5.0 (X11; Linux x86_64)"), CrawlerClass::Human);
//! ```

pub mod signatures;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use signatures::{CrawlerSignature, DEFAULT_SIGNATURES};

/// Class of the client that issued a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlerClass {
    /// Ordinary browser traffic
    Human,
    /// Search-engine indexers
    SearchEngine,
    /// Social-media link-preview fetchers
    SocialMedia,
    /// Any other automated client
    OtherBot,
}

impl CrawlerClass {
    /// All bot classes, in policy-table order
    pub const BOTS: [CrawlerClass; 3] = [
        CrawlerClass::SearchEngine,
        CrawlerClass::SocialMedia,
        CrawlerClass::OtherBot,
    ];

    /// Whether this class takes the render path
    pub fn is_bot(&self) -> bool {
        !matches!(self, CrawlerClass::Human)
    }

    /// Short tag used as the last segment of cache keys
    pub fn cache_tag(&self) -> &'static str {
        match self {
            CrawlerClass::Human => "human",
            CrawlerClass::SearchEngine => "se",
            CrawlerClass::SocialMedia => "sm",
            CrawlerClass::OtherBot => "bot",
        }
    }

    /// Value of the `X-Crawler-Type` response header
    pub fn header_label(&self) -> &'static str {
        match self {
            CrawlerClass::Human => "Human",
            CrawlerClass::SearchEngine => "SearchEngine",
            CrawlerClass::SocialMedia => "SocialMedia",
            CrawlerClass::OtherBot => "Bot",
        }
    }
}

impl fmt::Display for CrawlerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlerClass::Human => "Human",
            CrawlerClass::SearchEngine => "SearchEngine",
            CrawlerClass::SocialMedia => "SocialMedia",
            CrawlerClass::OtherBot => "OtherBot",
        };
        f.write_str(name)
    }
}

/// Classify a User-Agent against the built-in signature table
pub fn classify(user_agent: &str) -> CrawlerClass {
    detect_in(DEFAULT_SIGNATURES, user_agent)
        .map(|sig| sig.class)
        .unwrap_or(CrawlerClass::Human)
}

/// Whether a User-Agent belongs to any bot class
pub fn is_bot(user_agent: &str) -> bool {
    classify(user_agent).is_bot()
}

fn detect_in<'a>(table: &'a [CrawlerSignature], user_agent: &str) -> Option<&'a CrawlerSignature> {
    if user_agent.is_empty() {
        return None;
    }
    let lowered = user_agent.to_lowercase();
    table.iter().find(|sig| lowered.contains(&*sig.token))
}

/// Classifier over an ordered, extensible signature table
///
/// The built-in signatures always come first; extra signatures supplied by
/// configuration are appended after them.
#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: Vec<CrawlerSignature>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            signatures: DEFAULT_SIGNATURES.to_vec(),
        }
    }
}

impl Classifier {
    /// Built-in table followed by `extra`
    pub fn with_extra(extra: impl IntoIterator<Item = CrawlerSignature>) -> Self {
        let mut classifier = Self::default();
        classifier
            .signatures
            .extend(extra.into_iter().map(CrawlerSignature::normalized));
        classifier
    }

    /// Classify a User-Agent string
    pub fn classify(&self, user_agent: &str) -> CrawlerClass {
        self.detect(user_agent)
            .map(|sig| sig.class)
            .unwrap_or(CrawlerClass::Human)
    }

    /// Return the matching signature, if any
    pub fn detect(&self, user_agent: &str) -> Option<&CrawlerSignature> {
        detect_in(&self.signatures, user_agent)
    }

    /// Signatures in match order
    pub fn signatures(&self) -> &[CrawlerSignature] {
        &self.signatures
    }
}
