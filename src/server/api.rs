//! HTTP routes and handlers
//!
//! Static asset paths and everything a human requests are redirected to the
//! origin; `/health` and `/metrics` are answered locally; every other `GET`
//! goes through the dispatcher.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatcher::DispatchOutcome;
use crate::metrics;
use crate::utils::join_origin;

use super::AppState;

/// Value of the `X-Rendered-By` header
pub const RENDERED_BY: &str = "rendergate";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");
const X_RENDERED_BY: HeaderName = HeaderName::from_static("x-rendered-by");
const X_CRAWLER_TYPE: HeaderName = HeaderName::from_static("x-crawler-type");

// ============================================================================
// API Response Types
// ============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub started_at: DateTime<Utc>,
    pub cache: CacheHealth,
    pub engine: EngineHealth,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
    pub reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct EngineHealth {
    pub browser_running: bool,
    pub active_sessions: usize,
    pub max_concurrent: usize,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Static assets are always served by the origin
        .route("/static/{*path}", get(static_redirect))
        .route("/assets/{*path}", get(static_redirect))
        .route("/favicon.ico", get(static_redirect))
        .route("/manifest.json", get(static_redirect))
        // Local endpoints
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Everything else
        .fallback(dispatch_handler)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.dispatcher.cache();
    let renderer = state.dispatcher.renderer();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        started_at: state.started_at,
        cache: CacheHealth {
            enabled: cache.is_enabled(),
            backend: cache.backend_name(),
            reachable: cache.health_check().await,
        },
        engine: EngineHealth {
            browser_running: renderer.is_browser_running(),
            active_sessions: renderer.active_sessions(),
            max_concurrent: renderer.max_concurrent(),
        },
    })
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Redirect static asset requests to the origin
async fn static_redirect(State(state): State<AppState>, uri: Uri) -> Response {
    redirect(join_origin(state.dispatcher.origin(), path_and_query(&uri)))
}

/// Classify and serve everything not matched by another route
async fn dispatch_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let outcome = state
        .dispatcher
        .dispatch(path_and_query(&uri), user_agent)
        .await;
    outcome_response(outcome)
}

// ============================================================================
// Response Building
// ============================================================================

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}

/// 302 to `location`
fn redirect(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Turn a dispatch outcome into the HTTP response
pub fn outcome_response(outcome: DispatchOutcome) -> Response {
    match outcome {
        DispatchOutcome::PassThrough { location, .. } => redirect(location),
        DispatchOutcome::Cached { html, .. } => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
            html,
        )
            .into_response(),
        DispatchOutcome::Rendered {
            html,
            class,
            render_duration_ms,
            cache_ttl_secs,
        } => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HTML_CONTENT_TYPE.to_string()),
                (
                    SERVER_TIMING,
                    format!(
                        "Prerender;dur={render_duration_ms};desc=\"Dynamic render duration (ms)\""
                    ),
                ),
                (X_RENDERED_BY, RENDERED_BY.to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={cache_ttl_secs}"),
                ),
                (X_CRAWLER_TYPE, class.header_label().to_string()),
            ],
            html,
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
