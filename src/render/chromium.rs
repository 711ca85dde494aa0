//! Chrome DevTools Protocol implementation of the browser traits

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, ResourceType,
    SetUserAgentOverrideParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::browser::{
    visibility_script, BrowserDriver, BrowserSession, PageSession, INJECT_MARKER_SCRIPT,
};
use super::EngineConfig;
use crate::utils::error::RenderError;

/// Flags passed to every browser process
pub const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
];

const NETWORK_IDLE_POLL: Duration = Duration::from_millis(50);

/// When navigation counts as settled: no request in flight for `window`
#[derive(Debug, Clone, Copy)]
struct NetworkIdle {
    window: Duration,
    max_wait: Duration,
}

/// Launches Chrome/Chromium through chromiumoxide
#[derive(Debug, Clone)]
pub struct ChromiumDriver {
    executable: Option<PathBuf>,
    headless: bool,
    width: u32,
    height: u32,
    user_agent: String,
    block_resources: bool,
    request_timeout: Duration,
    network_idle: NetworkIdle,
}

impl ChromiumDriver {
    /// Driver for the given engine config; `origin` appears in the default user agent
    pub fn new(config: &EngineConfig, origin: &str) -> Self {
        Self {
            executable: config.chrome_path.clone(),
            headless: config.headless,
            width: config.viewport_width,
            height: config.viewport_height,
            user_agent: config.user_agent_for(origin),
            block_resources: config.block_resources,
            request_timeout: config.navigation_timeout(),
            network_idle: NetworkIdle {
                window: config.network_idle_window(),
                max_wait: config.network_idle_max_wait(),
            },
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn browser_config(&self) -> Result<BrowserConfig, RenderError> {
        let viewport = Viewport {
            width: self.width,
            height: self.height,
            ..Default::default()
        };

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(self.width, self.height)
            .viewport(viewport)
            .request_timeout(self.request_timeout)
            .args(LAUNCH_ARGS.iter().copied());

        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(RenderError::Launch)
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    type Browser = ChromiumBrowser;

    async fn launch(&self) -> Result<ChromiumBrowser, RenderError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the
        // browser's whole lifetime.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "CDP handler error");
                }
            }
            tracing::debug!("CDP handler finished");
        });

        Ok(ChromiumBrowser {
            browser: Mutex::new(browser),
            handler_task,
            user_agent: self.user_agent.clone(),
            block_resources: self.block_resources,
            network_idle: self.network_idle,
        })
    }
}

/// A running Chrome process
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    user_agent: String,
    block_resources: bool,
    network_idle: NetworkIdle,
}

impl ChromiumBrowser {
    /// Abort image, font and media requests for `page`
    async fn block_subresources(page: &Page) -> Result<JoinHandle<()>, RenderError> {
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| RenderError::Navigation(format!("request interception: {e}")))?;

        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        page.execute(EnableParams::builder().pattern(pattern).build())
            .await
            .map_err(|e| RenderError::Navigation(format!("request interception: {e}")))?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let result = if is_blocked(&event.resource_type) {
                    page.execute(FailRequestParams::new(
                        request_id,
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = result {
                    tracing::trace!(error = %e, "Intercepted request could not be resolved");
                }
            }
        }))
    }
}

fn is_blocked(resource: &ResourceType) -> bool {
    matches!(
        resource,
        ResourceType::Image | ResourceType::Font | ResourceType::Media
    )
}

#[async_trait]
impl BrowserSession for ChromiumBrowser {
    type Page = ChromiumPage;

    async fn new_page(&self) -> Result<ChromiumPage, RenderError> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::Launch(format!("new page: {e}")))?
        };

        let mut session = ChromiumPage {
            page: Some(page),
            interceptor: None,
            network_watch: None,
            network_idle: self.network_idle,
        };

        if let Err(e) = session.prepare(&self.user_agent, self.block_resources).await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn close(&self) -> Result<(), RenderError> {
        let mut browser = self.browser.lock().await;
        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Launch(format!("close: {e}")));
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "Browser process wait failed");
        }
        self.handler_task.abort();
        result
    }
}

/// Requests in flight on a page, keyed by CDP request id
#[derive(Debug)]
struct NetworkActivity {
    inflight: HashSet<String>,
    last_change: Instant,
}

impl NetworkActivity {
    fn new(now: Instant) -> Self {
        Self {
            inflight: HashSet::new(),
            last_change: now,
        }
    }

    fn started(&mut self, request_id: String, now: Instant) {
        self.inflight.insert(request_id);
        self.last_change = now;
    }

    fn finished(&mut self, request_id: &str, now: Instant) {
        if self.inflight.remove(request_id) {
            self.last_change = now;
        }
    }

    fn is_idle(&self, now: Instant, window: Duration) -> bool {
        self.inflight.is_empty() && now.saturating_duration_since(self.last_change) >= window
    }
}

enum NetworkEvent {
    Started(String),
    Finished(String),
}

/// One Chrome tab
pub struct ChromiumPage {
    page: Option<Page>,
    interceptor: Option<JoinHandle<()>>,
    network_watch: Option<JoinHandle<()>>,
    network_idle: NetworkIdle,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::Extraction("page already closed".to_string()))
    }

    async fn prepare(&mut self, user_agent: &str, block_resources: bool) -> Result<(), RenderError> {
        let page = self.page()?.clone();
        page.set_user_agent(user_agent_override(user_agent))
            .await
            .map_err(|e| RenderError::Navigation(format!("user agent: {e}")))?;

        if block_resources {
            self.interceptor = Some(ChromiumBrowser::block_subresources(&page).await?);
        }
        Ok(())
    }

    /// Track request start/finish events on `page` until the page closes
    async fn watch_network(
        &mut self,
        page: &Page,
    ) -> Result<Arc<Mutex<NetworkActivity>>, RenderError> {
        let listen_err = |e| RenderError::Navigation(format!("network events: {e}"));
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(listen_err)?
            .map(|e| NetworkEvent::Started(e.request_id.inner().clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(listen_err)?
            .map(|e| NetworkEvent::Finished(e.request_id.inner().clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(listen_err)?
            .map(|e| NetworkEvent::Finished(e.request_id.inner().clone()));

        let activity = Arc::new(Mutex::new(NetworkActivity::new(Instant::now())));
        let tracked = Arc::clone(&activity);
        let mut events = Box::pin(futures::stream::select(
            started,
            futures::stream::select(finished, failed),
        ));

        self.network_watch = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let now = Instant::now();
                let mut activity = tracked.lock().await;
                match event {
                    NetworkEvent::Started(id) => activity.started(id, now),
                    NetworkEvent::Finished(id) => activity.finished(&id, now),
                }
            }
        }));
        Ok(activity)
    }

    /// Wait until no request has been in flight for the idle window
    ///
    /// Pages that never go quiet (long polling, streaming) continue after
    /// `max_wait` instead of failing.
    async fn wait_for_network_idle(&self, activity: &Mutex<NetworkActivity>) {
        let NetworkIdle { window, max_wait } = self.network_idle;
        let deadline = Instant::now() + max_wait;
        loop {
            let now = Instant::now();
            let inflight = {
                let activity = activity.lock().await;
                if activity.is_idle(now, window) {
                    return;
                }
                activity.inflight.len()
            };
            if now >= deadline {
                tracing::debug!(inflight, "Network still busy after navigation, continuing");
                return;
            }
            tokio::time::sleep(NETWORK_IDLE_POLL).await;
        }
    }
}

fn user_agent_override(user_agent: &str) -> SetUserAgentOverrideParams {
    SetUserAgentOverrideParams::new(user_agent.to_string())
}

#[async_trait]
impl PageSession for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        let page = self.page()?.clone();
        let activity = if self.network_idle.window.is_zero() {
            None
        } else {
            Some(self.watch_network(&page).await?)
        };

        page.goto(url)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        if let Some(activity) = activity {
            self.wait_for_network_idle(&activity).await;
        }
        if let Some(task) = self.network_watch.take() {
            task.abort();
        }
        Ok(())
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool, RenderError> {
        self.page()?
            .evaluate(visibility_script(selector))
            .await
            .map_err(|e| RenderError::Extraction(format!("selector {selector}: {e}")))?
            .into_value::<bool>()
            .map_err(|e| RenderError::Extraction(format!("selector {selector}: {e}")))
    }

    async fn inject_marker(&mut self) -> Result<(), RenderError> {
        self.page()?
            .evaluate(INJECT_MARKER_SCRIPT)
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Extraction(format!("marker: {e}")))
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.page()?
            .content()
            .await
            .map_err(|e| RenderError::Extraction(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        for task in [self.interceptor.take(), self.network_watch.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        match self.page.take() {
            Some(page) => page
                .close()
                .await
                .map_err(|e| RenderError::Extraction(format!("close: {e}"))),
            None => Ok(()),
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for task in [self.interceptor.take(), self.network_watch.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
