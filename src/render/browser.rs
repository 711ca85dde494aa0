//! Browser abstraction used by the render engine
//!
//! The engine only needs a handful of operations from a headless browser.
//! They are expressed as traits so admission, timeout and release logic can
//! be exercised without a Chrome binary; [`super::chromium`] provides the
//! real implementation.

use async_trait::async_trait;

use crate::utils::error::RenderError;

/// Starts the shared browser process
#[async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    type Browser: BrowserSession;

    /// Launch a new browser process
    async fn launch(&self) -> Result<Self::Browser, RenderError>;
}

/// A running browser process
#[async_trait]
pub trait BrowserSession: Send + Sync + 'static {
    type Page: PageSession;

    /// Open a fresh page (tab) with its own state
    async fn new_page(&self) -> Result<Self::Page, RenderError>;

    /// Terminate the browser process
    async fn close(&self) -> Result<(), RenderError>;
}

/// One page session; never reused across renders
#[async_trait]
pub trait PageSession: Send + 'static {
    /// Load `url` and wait for the load event
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Whether `selector` matches an element that is currently visible
    async fn is_visible(&mut self, selector: &str) -> Result<bool, RenderError>;

    /// Mark the live document as already rendered
    async fn inject_marker(&mut self) -> Result<(), RenderError>;

    /// Serialize the live DOM
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Close the page; further calls are invalid
    async fn close(&mut self) -> Result<(), RenderError>;
}

/// Marker element appended to `<head>` of every snapshot
pub const RENDER_MARKER: &str = r#"<meta name="dynamic-rendered" content="true">"#;

/// Script that appends [`RENDER_MARKER`] to the document head
pub const INJECT_MARKER_SCRIPT: &str = r#"(() => {
  const meta = document.createElement('meta');
  meta.name = 'dynamic-rendered';
  meta.content = 'true';
  (document.head || document.documentElement).appendChild(meta);
  return true;
})()"#;

/// Build the visibility probe for a selector
///
/// Elements inside `<head>` (such as `meta` tags) are never laid out, so
/// they count as visible as soon as they exist.
pub fn visibility_script(selector: &str) -> String {
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
  const el = document.querySelector({literal});
  if (!el) return false;
  if (el.closest('head')) return true;
  const style = window.getComputedStyle(el);
  if (!style || style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 || rect.height > 0;
}})()"#
    )
}
