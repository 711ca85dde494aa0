//! Unified error handling for the rendergate crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`RendergateErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Cache errors never appear here: the render cache absorbs them and
//! degrades to a miss.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rendergate::error::{Error, ErrorCategory, RendergateErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {}", err);
//!     } else {
//!         eprintln!("Fatal error ({}): {}", err.category(), err);
//!     }
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::utils::error::{CacheError, RenderError, TimeoutStage};

/// Common trait for all rendergate error types
pub trait RendergateErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Headless browser and page errors
    Render,
    /// Socket and HTTP serving errors
    Network,
    /// Parsing and serialization errors
    Parsing,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Render => "render",
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Config => "config",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl RendergateErrorTrait for RenderError {
    fn is_recoverable(&self) -> bool {
        RenderError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Render
    }
}

/// Unified error type for the rendergate crate
#[derive(Error, Debug)]
pub enum Error {
    /// Render engine errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// I/O errors (binding the listener, reading files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RendergateErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Render(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) | Self::Toml(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Render(_) => ErrorCategory::Render,
            Self::Io(_) => ErrorCategory::Network,
            Self::Json(_) | Self::Toml(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Configuration loading and validation report through anyhow
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
