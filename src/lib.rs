//! rendergate - Dynamic rendering gateway
//!
//! Sits in front of a single-page application. Human visitors are redirected
//! to the origin; crawlers are served the HTML a headless browser produces
//! after client-side scripts have run, cached per crawler class.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`crawler`] - User-Agent classification
//! - [`cache`] - Snapshot cache (Redis or in-process) that never fails a request
//! - [`render`] - Concurrency-limited headless-browser render engine
//! - [`dispatcher`] - Per-request decision between redirect, cache and render
//! - [`server`] - axum routes, health and metrics endpoints, graceful shutdown
//! - [`config`] - Configuration from environment variables or TOML
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use rendergate::config::Config;
//! use rendergate::server::{build_dispatcher, shutdown_signal, GatewayServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let dispatcher = build_dispatcher(&config).await;
//!     let server = GatewayServer::new(config, dispatcher)?;
//!     server.start_with_shutdown(shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod crawler;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod render;
pub mod server;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheConfig, RenderCache};
    pub use crate::config::Config;
    pub use crate::crawler::{Classifier, CrawlerClass};
    pub use crate::dispatcher::{DispatchOutcome, Dispatcher, PolicyTable, RenderPolicy};
    pub use crate::error::{Error, ErrorCategory, RendergateErrorTrait, Result};
    pub use crate::render::{EngineConfig, RenderEngine, RenderResult, Renderer};
}

// Direct re-exports for convenience
pub use crawler::{classify, is_bot, CrawlerClass};
