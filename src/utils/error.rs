//! Error types for the render and cache layers
//!
//! This module defines custom error types used throughout the application.

use std::time::Duration;
use thiserror::Error;

/// Stage of a render call that ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// Loading the target URL
    Navigation,
    /// Waiting for the wait selector to become visible
    Selector,
}

impl std::fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigation => f.write_str("navigation"),
            Self::Selector => f.write_str("selector wait"),
        }
    }
}

/// Errors that can occur while rendering a page
#[derive(Error, Debug)]
pub enum RenderError {
    /// Navigation or selector wait exceeded its bound
    #[error("Render timed out during {stage} after {elapsed:?}")]
    Timeout {
        stage: TimeoutStage,
        elapsed: Duration,
    },

    /// The page failed to load
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// DOM serialization or marker injection failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Browser process could not be started
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Engine no longer accepts renders
    #[error("Render engine is closed")]
    Closed,
}

impl RenderError {
    /// Short machine-readable kind, used for log fields and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Navigation(_) => "navigation",
            Self::Extraction(_) => "extraction",
            Self::Launch(_) => "launch",
            Self::Closed => "closed",
        }
    }

    /// Whether the same render could succeed if attempted again
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Navigation(_))
    }
}

/// Errors raised by a cache backend
///
/// These never leave the cache module; the render cache logs them and
/// degrades to a miss or no-op.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Could not obtain a connection from the pool
    #[error("Cache connection failed: {0}")]
    Connection(String),

    /// Command failed on an established connection
    #[error("Cache command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// Operation did not complete within its bound
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl CacheError {
    /// Connection-level failures are retried with backoff
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Command(e) => {
                e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() || e.is_timeout()
            }
        }
    }
}
