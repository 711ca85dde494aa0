//! HTTP front of the gateway
//!
//! This module wires the dispatcher into an axum router and runs it with
//! graceful shutdown: on SIGINT/SIGTERM the listener stops accepting
//! connections, the render engine drains and closes its browser, and the
//! cache pool is closed.

pub mod api;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::cache::RenderCache;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::render::chromium::ChromiumDriver;
use crate::render::{RenderEngine, Renderer};

pub use self::api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Request dispatcher (owns cache and renderer handles)
    pub dispatcher: Dispatcher,

    /// Server start time
    pub start_time: Instant,

    /// Wall-clock start time, reported by `/health`
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// Build the production dispatcher: Chrome-backed engine plus configured cache
pub async fn build_dispatcher(config: &Config) -> Dispatcher {
    let cache = RenderCache::from_config(&config.cache).await;
    let driver = ChromiumDriver::new(&config.engine, &config.server.origin);
    let renderer: Arc<dyn Renderer> = Arc::new(RenderEngine::new(driver, config.engine.clone()));

    Dispatcher::new(
        &config.server.origin,
        config.classifier(),
        config.policy_table(),
        cache,
        renderer,
    )
}

// ============================================================================
// Gateway Server
// ============================================================================

/// Main gateway server
pub struct GatewayServer {
    config: Config,
    state: AppState,
}

impl GatewayServer {
    /// Create a server around an existing dispatcher
    pub fn new(config: Config, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: AppState::new(dispatcher),
        })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves, then release engine and cache
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.build_router();
        let addr = self.config.bind_addr();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::with_source(format!("Failed to bind {addr}"), e))?;

        tracing::info!(
            addr = %addr,
            origin = %self.config.server.origin,
            cache = self.state.dispatcher.cache().backend_name().unwrap_or("disabled"),
            max_concurrent = self.config.engine.max_concurrent,
            "Gateway listening"
        );

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await;

        self.shutdown().await;

        served.map_err(|e| Error::with_source("Server error", e))?;
        tracing::info!("Gateway shutdown complete");
        Ok(())
    }

    /// Release engine and cache resources
    pub async fn shutdown(&self) {
        self.state.dispatcher.renderer().close().await;
        self.state.dispatcher.cache().close().await;
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_addr(),
            origin: self.config.server.origin.clone(),
            cache_backend: self.state.dispatcher.cache().backend_name().unwrap_or("disabled"),
            max_concurrent: self.config.engine.max_concurrent,
            request_logging_enabled: self.config.server.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: String,
    pub origin: String,
    pub cache_backend: &'static str,
    pub max_concurrent: usize,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "rendergate\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Origin: {}\n\
             Cache: {}\n\
             Max Concurrent Pages: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.origin,
            self.cache_backend,
            self.max_concurrent,
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

/// Resolves on SIGINT or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================
