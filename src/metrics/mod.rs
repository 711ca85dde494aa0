//! Prometheus metrics for the render gateway
//!
//! This module provides metrics tracking for:
//! - Render engine: render outcomes, render duration, active page sessions
//! - Render cache: lookups by result
//! - Dispatcher: pass-through responses by reason
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all gateway metrics
struct GatewayMetrics {
    renders: CounterVec,
    render_duration: HistogramVec,
    active_sessions: Gauge,
    cache_lookups: CounterVec,
    pass_through: CounterVec,
}

/// Global storage for gateway metrics
static GATEWAY_METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = rendergate::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = GatewayMetrics {
        renders: register_counter_vec!(
            "rendergate_renders_total",
            "Total render calls by crawler class and outcome",
            &["class", "outcome"]
        )?,
        render_duration: register_histogram_vec!(
            "rendergate_render_duration_seconds",
            "Time spent rendering a page in seconds",
            &["class"],
            vec![0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 30.0, 60.0]
        )?,
        active_sessions: register_gauge!(
            "rendergate_active_page_sessions",
            "Number of currently open page sessions"
        )?,
        cache_lookups: register_counter_vec!(
            "rendergate_cache_lookups_total",
            "Render cache lookups by result (hit, miss, error)",
            &["result"]
        )?,
        pass_through: register_counter_vec!(
            "rendergate_pass_through_total",
            "Requests answered with a redirect to the origin, by reason",
            &["reason"]
        )?,
    };

    GATEWAY_METRICS
        .set(metrics)
        .map_err(|_| "Gateway metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    GATEWAY_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished render
///
/// `outcome` is `"ok"` or a render error kind.
pub fn record_render(class: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = GATEWAY_METRICS.get() else {
        return;
    };

    m.renders.with_label_values(&[class, outcome]).inc();
    if outcome == "ok" {
        m.render_duration
            .with_label_values(&[class])
            .observe(duration_secs);
    }
}

/// Set the number of open page sessions
pub fn set_active_sessions(count: usize) {
    if let Some(m) = GATEWAY_METRICS.get() {
        m.active_sessions.set(count as f64);
    }
}

/// Record a cache lookup result
pub fn record_cache_lookup(result: &str) {
    if let Some(m) = GATEWAY_METRICS.get() {
        m.cache_lookups.with_label_values(&[result]).inc();
    }
}

/// Record a pass-through response
pub fn record_pass_through(reason: &str) {
    if let Some(m) = GATEWAY_METRICS.get() {
        m.pass_through.with_label_values(&[reason]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================
