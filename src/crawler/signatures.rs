//! Known crawler User-Agent signatures

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use super::CrawlerClass;

/// One entry of the signature table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerSignature {
    /// Lowercase substring searched for in the User-Agent
    pub token: Cow<'static, str>,
    /// Human-readable crawler name, used in logs
    pub name: Cow<'static, str>,
    /// Class assigned on match
    pub class: CrawlerClass,
}

impl CrawlerSignature {
    /// Create a signature; the token is lowercased
    pub fn new(token: &str, name: &str, class: CrawlerClass) -> Self {
        Self {
            token: Cow::Owned(token.to_lowercase()),
            name: Cow::Owned(name.to_string()),
            class,
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.token.chars().any(char::is_uppercase) {
            self.token = Cow::Owned(self.token.to_lowercase());
        }
        self
    }

    const fn builtin(token: &'static str, name: &'static str, class: CrawlerClass) -> Self {
        Self {
            token: Cow::Borrowed(token),
            name: Cow::Borrowed(name),
            class,
        }
    }
}

/// Built-in table, in match order
pub static DEFAULT_SIGNATURES: &[CrawlerSignature] = &[
    CrawlerSignature::builtin("googlebot", "Google", CrawlerClass::SearchEngine),
    CrawlerSignature::builtin("bingbot", "Bing", CrawlerClass::SearchEngine),
    CrawlerSignature::builtin("baiduspider", "Baidu", CrawlerClass::SearchEngine),
    CrawlerSignature::builtin("360spider", "360", CrawlerClass::SearchEngine),
    CrawlerSignature::builtin("sogou", "Sogou", CrawlerClass::SearchEngine),
    CrawlerSignature::builtin("facebookexternalhit", "Facebook", CrawlerClass::SocialMedia),
    CrawlerSignature::builtin("twitterbot", "Twitter", CrawlerClass::SocialMedia),
    CrawlerSignature::builtin("linkedinbot", "LinkedIn", CrawlerClass::SocialMedia),
];
