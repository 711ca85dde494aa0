//! Headless-browser render engine
//!
//! Turns a URL into the HTML serialization of its DOM after client-side
//! scripts have run. At most `max_concurrent` page sessions are open at any
//! moment; excess callers queue in FIFO order on a tokio semaphore.
//!
//! A render call moves through: acquire a slot, open a fresh page, navigate
//! (bounded by the navigation timeout), optionally wait for a visible
//! selector (bounded by the selector timeout), inject the render marker,
//! serialize the DOM. The page is closed on every exit path before the slot
//! is released.
//!
//! # Example
//!
//! ```rust,ignore
//! use rendergate::render::{chromium::ChromiumDriver, EngineConfig, RenderEngine};
//!
//! let config = EngineConfig::default();
//! let driver = ChromiumDriver::new(&config, "http://localhost:3002");
//! let engine = RenderEngine::new(driver, config);
//! let result = engine.render("http://localhost:3002/products/42", Some("#root")).await?;
//! println!("{} bytes in {}ms", result.html.len(), result.render_duration_ms);
//! engine.close().await;
//! ```

pub mod browser;
pub mod chromium;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::metrics;
use crate::utils::error::{RenderError, TimeoutStage};

pub use self::browser::{BrowserDriver, BrowserSession, PageSession, RENDER_MARKER};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the wait selector to become visible.
pub const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace period for in-flight renders at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Render engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum simultaneously open page sessions
    pub max_concurrent: usize,

    /// Navigation bound in milliseconds
    pub navigation_timeout_ms: u64,

    /// Selector wait bound in milliseconds
    pub selector_timeout_ms: u64,

    /// Interval between visibility probes in milliseconds
    pub selector_poll_interval_ms: u64,

    /// How long `close()` waits for in-flight renders in milliseconds
    pub shutdown_grace_ms: u64,

    /// Browser executable; auto-detected when unset
    pub chrome_path: Option<PathBuf>,

    /// Run the browser without a window
    pub headless: bool,

    /// User agent override; derived from the origin when unset
    pub user_agent: Option<String>,

    /// Viewport width in CSS pixels
    pub viewport_width: u32,

    /// Viewport height in CSS pixels
    pub viewport_height: u32,

    /// Abort image, font and media requests
    pub block_resources: bool,

    /// Navigation settles once no request has been in flight for this long,
    /// in milliseconds; 0 returns as soon as the load event fires
    pub network_idle_ms: u64,

    /// Upper bound on the network-idle wait in milliseconds; busy pages
    /// continue to the selector wait afterwards
    pub network_idle_max_wait_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT.as_millis() as u64,
            selector_timeout_ms: DEFAULT_SELECTOR_TIMEOUT.as_millis() as u64,
            selector_poll_interval_ms: 100,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE.as_millis() as u64,
            chrome_path: None,
            headless: true,
            user_agent: None,
            viewport_width: 1920,
            viewport_height: 1080,
            block_resources: true,
            network_idle_ms: 500,
            network_idle_max_wait_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent: std::env::var("MAX_CONCURRENT_PAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent),
            navigation_timeout_ms: std::env::var("PAGE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.navigation_timeout_ms),
            selector_timeout_ms: std::env::var("SELECTOR_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.selector_timeout_ms),
            chrome_path: std::env::var("CHROME_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            user_agent: std::env::var("RENDER_USER_AGENT")
                .ok()
                .filter(|s| !s.is_empty()),
            ..defaults
        }
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    #[must_use]
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    #[must_use]
    pub fn selector_poll_interval(&self) -> Duration {
        Duration::from_millis(self.selector_poll_interval_ms.max(10))
    }

    #[must_use]
    pub fn network_idle_window(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    #[must_use]
    pub fn network_idle_max_wait(&self) -> Duration {
        Duration::from_millis(self.network_idle_max_wait_ms)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// User agent sent by rendered pages
    pub fn user_agent_for(&self, origin: &str) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| default_user_agent(origin))
    }
}

/// `Mozilla/5.0 (compatible; rendergate/<version>; +<origin>)`
pub fn default_user_agent(origin: &str) -> String {
    format!(
        "Mozilla/5.0 (compatible; rendergate/{}; +{})",
        env!("CARGO_PKG_VERSION"),
        origin.trim_end_matches('/')
    )
}

/// Result of rendering a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    /// Serialized DOM including the render marker
    pub html: String,
    /// Wall time from admission request to serialization
    pub render_duration_ms: u64,
}

/// Anything that can turn a URL into rendered HTML
///
/// The dispatcher and server depend on this rather than on a concrete
/// engine, so tests can substitute scripted renderers.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    /// Render `url`, optionally waiting for `wait_selector` to become visible
    async fn render(
        &self,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<RenderResult, RenderError>;

    /// Launch the browser ahead of the first render
    async fn open(&self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Stop admitting renders and release the browser
    async fn close(&self) {}

    /// Page sessions currently open
    fn active_sessions(&self) -> usize {
        0
    }

    /// Upper bound on open page sessions
    fn max_concurrent(&self) -> usize;

    /// Whether the browser process is running
    fn is_browser_running(&self) -> bool {
        false
    }
}

/// Admission slot; decrements the session count when dropped
struct SessionSlot<'a> {
    _permit: SemaphorePermit<'a>,
    active: &'a AtomicUsize,
}

impl Drop for SessionSlot<'_> {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_active_sessions(remaining);
    }
}

/// Concurrency-limited render engine over a browser driver
pub struct RenderEngine<D: BrowserDriver> {
    driver: D,
    config: EngineConfig,
    permits: Semaphore,
    active: AtomicUsize,
    closed: AtomicBool,
    browser_running: AtomicBool,
    browser: Mutex<Option<Arc<D::Browser>>>,
}

impl<D: BrowserDriver> std::fmt::Debug for RenderEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("max_concurrent", &self.max_concurrent())
            .field("active_sessions", &self.active.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<D: BrowserDriver> RenderEngine<D> {
    /// Create an engine; the browser is launched on first use
    pub fn new(driver: D, config: EngineConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            driver,
            config,
            permits: Semaphore::new(permits),
            active: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            browser_running: AtomicBool::new(false),
            browser: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> Result<SessionSlot<'_>, RenderError> {
        if self.is_closed() {
            return Err(RenderError::Closed);
        }
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RenderError::Closed)?;
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_sessions(now_active);
        Ok(SessionSlot {
            _permit: permit,
            active: &self.active,
        })
    }

    /// Shared browser handle, launching it if needed
    async fn browser(&self) -> Result<Arc<D::Browser>, RenderError> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(Arc::clone(browser));
        }
        if self.is_closed() {
            return Err(RenderError::Closed);
        }

        let started = Instant::now();
        let browser = Arc::new(self.driver.launch().await?);
        *guard = Some(Arc::clone(&browser));
        self.browser_running.store(true, Ordering::SeqCst);
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            max_concurrent = self.max_concurrent(),
            "Browser launched"
        );
        Ok(browser)
    }

    /// Forget a browser that can no longer open pages; the next render relaunches
    async fn discard_browser(&self, failed: &Arc<D::Browser>) {
        let stale = {
            let mut guard = self.browser.lock().await;
            match guard.as_ref() {
                Some(current) if Arc::ptr_eq(current, failed) => {
                    self.browser_running.store(false, Ordering::SeqCst);
                    guard.take()
                }
                _ => None,
            }
        };
        if let Some(browser) = stale {
            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "Discarded browser did not close cleanly");
            }
        }
    }

    async fn drive(
        &self,
        page: &mut <D::Browser as BrowserSession>::Page,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<String, RenderError> {
        let navigation_timeout = self.config.navigation_timeout();
        let started = Instant::now();
        match tokio::time::timeout(navigation_timeout, page.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RenderError::Timeout {
                    stage: TimeoutStage::Navigation,
                    elapsed: started.elapsed(),
                })
            }
        }

        if let Some(selector) = wait_selector.filter(|s| !s.trim().is_empty()) {
            self.wait_for_visible(page, selector).await?;
        }

        page.inject_marker().await?;
        page.content().await
    }

    /// Poll until `selector` is visible; running out of time is a failure
    async fn wait_for_visible(
        &self,
        page: &mut <D::Browser as BrowserSession>::Page,
        selector: &str,
    ) -> Result<(), RenderError> {
        let timeout = self.config.selector_timeout();
        let interval = self.config.selector_poll_interval();
        let started = Instant::now();

        let poll = async {
            loop {
                if page.is_visible(selector).await? {
                    return Ok::<(), RenderError>(());
                }
                tokio::time::sleep(interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout {
                stage: TimeoutStage::Selector,
                elapsed: started.elapsed(),
            }),
        }
    }

    /// Wait for in-flight renders (bounded by the grace period), then close the browser
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let in_flight = self.active.load(Ordering::SeqCst);
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for in-flight renders");
        }

        let all = self.max_concurrent() as u32;
        match tokio::time::timeout(self.config.shutdown_grace(), self.permits.acquire_many(all)).await
        {
            Ok(Ok(_drained)) => tracing::debug!("Render engine drained"),
            Ok(Err(_)) => {}
            Err(_) => tracing::warn!(
                in_flight = self.active.load(Ordering::SeqCst),
                grace_ms = self.config.shutdown_grace_ms,
                "Shutdown grace elapsed, closing browser with renders in flight"
            ),
        }
        self.permits.close();

        let browser = self.browser.lock().await.take();
        self.browser_running.store(false, Ordering::SeqCst);
        if let Some(browser) = browser {
            match browser.close().await {
                Ok(()) => tracing::info!("Browser closed"),
                Err(e) => tracing::warn!(error = %e, "Browser did not close cleanly"),
            }
        }
    }
}

#[async_trait]
impl<D: BrowserDriver> Renderer for RenderEngine<D> {
    async fn render(
        &self,
        url: &str,
        wait_selector: Option<&str>,
    ) -> Result<RenderResult, RenderError> {
        let started = Instant::now();
        let _slot = self.acquire().await?;

        let browser = self.browser().await?;
        let mut page = match browser.new_page().await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(error = %e, "Could not open page, discarding browser");
                self.discard_browser(&browser).await;
                return Err(e);
            }
        };

        let outcome = self.drive(&mut page, url, wait_selector).await;
        if let Err(e) = page.close().await {
            tracing::debug!(url = %url, error = %e, "Page did not close cleanly");
        }

        let html = outcome?;
        Ok(RenderResult {
            html,
            render_duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn open(&self) -> Result<(), RenderError> {
        self.browser().await.map(|_| ())
    }

    async fn close(&self) {
        self.shutdown().await;
    }

    fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn max_concurrent(&self) -> usize {
        self.config.max_concurrent.max(1)
    }

    fn is_browser_running(&self) -> bool {
        self.browser_running.load(Ordering::SeqCst)
    }
}
