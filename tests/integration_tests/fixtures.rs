//! Test fixtures for integration tests
//!
//! Provides sample snapshot HTML

/// Snapshot of a product page after client-side rendering
pub const PRODUCT_PAGE_HTML: &str = r#"<!DOCTYPE html><html lang="en"><head>
<meta charset="UTF-8">
<title>Product 42</title>
<meta property="og:title" content="Product 42">
<meta name="dynamic-rendered" content="true"></head>
<body><div id="root"><h1>Product 42</h1><p>In stock</p></div></body></html>"#;

/// Snapshot of a share page with Open Graph tags
pub const SHARE_PAGE_HTML: &str = r#"<!DOCTYPE html><html><head>
<meta property="og:title" content="Shared post">
<meta name="twitter:card" content="summary">
<meta name="dynamic-rendered" content="true"></head>
<body><div id="root"></div></body></html>"#;
