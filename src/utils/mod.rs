//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

/// Join an origin (`scheme://host[:port]`) and a request path with query
///
/// A trailing slash on the origin and a missing leading slash on the path are
/// both tolerated.
pub fn join_origin(origin: &str, path_and_query: &str) -> String {
    let origin = origin.trim_end_matches('/');
    if path_and_query.is_empty() {
        format!("{origin}/")
    } else if path_and_query.starts_with('/') {
        format!("{origin}{path_and_query}")
    } else {
        format!("{origin}/{path_and_query}")
    }
}

/// Format byte size as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return String::from("0 B");
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes as f64 / base.powi(exponent as i32);

    format!("{value:.2} {}", UNITS[exponent])
}
