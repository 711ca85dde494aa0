//! HTTP router tests
//!
//! Drives the axum router directly with `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::sync::Arc;

use rendergate::server::{create_router, AppState};

use super::fixtures::PRODUCT_PAGE_HTML;
use crate::common::{
    dispatcher, memory_cache, test_config, Script, ScriptedRenderer, CHROME_UA, FACEBOOK_UA,
    GOOGLEBOT_UA,
};
use tower::ServiceExt;

fn router(renderer: Arc<ScriptedRenderer>) -> Router {
    let config = test_config();
    let (cache, _) = memory_cache(&config.cache);
    create_router(AppState::new(dispatcher(&config, cache, renderer)))
}

fn get(uri: &str, user_agent: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_human_gets_302_to_origin() {
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let app = router(renderer.clone());

    let response = app.oneshot(get("/products/42?color=red", CHROME_UA)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:3002/products/42?color=red"
    );
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_crawler_gets_rendered_html_with_metadata() {
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let app = router(renderer);

    let response = app.oneshot(get("/products/42", GOOGLEBOT_UA)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(headers["x-rendered-by"], "rendergate");
    assert_eq!(headers["x-crawler-type"], "SearchEngine");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(
        headers["server-timing"],
        "Prerender;dur=250;desc=\"Dynamic render duration (ms)\""
    );
    assert_eq!(body_string(response).await, PRODUCT_PAGE_HTML);
}

#[tokio::test]
async fn test_cache_hit_served_without_render() {
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let app = router(renderer.clone());

    let first = app.clone().oneshot(get("/products/42", GOOGLEBOT_UA)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(get("/products/42", GOOGLEBOT_UA)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert!(second.headers().get("x-rendered-by").is_none());
    assert_eq!(body_string(second).await, PRODUCT_PAGE_HTML);
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_render_failure_redirects() {
    let renderer = Arc::new(ScriptedRenderer::new(Script::NavigationError));
    let app = router(renderer);

    let response = app.oneshot(get("/share/9", FACEBOOK_UA)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:3002/share/9"
    );
}

#[tokio::test]
async fn test_static_paths_redirect_even_for_crawlers() {
    let renderer = Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML));
    let app = router(renderer.clone());

    for path in [
        "/static/js/main.js",
        "/assets/logo.svg",
        "/favicon.ico",
        "/manifest.json",
    ] {
        let response = app.clone().oneshot(get(path, GOOGLEBOT_UA)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND, "{path}");
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("http://localhost:3002{path}").as_str()
        );
    }
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_health_reports_ok() {
    let app = router(Arc::new(ScriptedRenderer::html("")));

    let response = app.oneshot(get("/health", CHROME_UA)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["started_at"].is_string());
    assert_eq!(body["cache"]["enabled"], true);
    assert_eq!(body["cache"]["backend"], "memory");
    assert_eq!(body["engine"]["max_concurrent"], 10);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let _ = rendergate::metrics::init_metrics();
    let app = router(Arc::new(ScriptedRenderer::html(PRODUCT_PAGE_HTML)));

    app.clone().oneshot(get("/about", GOOGLEBOT_UA)).await.unwrap();
    let response = app.oneshot(get("/metrics", CHROME_UA)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("rendergate_renders_total"));
}

#[tokio::test]
async fn test_non_get_is_rejected() {
    let app = router(Arc::new(ScriptedRenderer::html("")));

    let request = Request::builder()
        .method("POST")
        .uri("/products/42")
        .header(header::USER_AGENT, GOOGLEBOT_UA)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
