use anyhow::{Context, Result};

use rendergate::config::Config;
use rendergate::crawler::CrawlerClass;
use rendergate::render::chromium::ChromiumDriver;
use rendergate::render::{RenderEngine, Renderer};
use rendergate::utils::{format_bytes, join_origin};

/// User agent used when none is given on the command line
pub const DEFAULT_RENDER_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// Render one path through the engine and print the snapshot
///
/// The cache is neither read nor written.
pub async fn render(config: &Config, path: &str, user_agent: Option<&str>) -> Result<()> {
    let user_agent = user_agent.unwrap_or(DEFAULT_RENDER_USER_AGENT);
    let classifier = config.classifier();
    let mut class = classifier.classify(user_agent);
    if class == CrawlerClass::Human {
        println!("User-Agent is not a known crawler; rendering with the other-bot policy.");
        class = CrawlerClass::OtherBot;
    }

    let policies = config.policy_table();
    let policy = policies
        .get(class)
        .context("No render policy for crawler class")?;
    let url = join_origin(&config.server.origin, path);

    println!("Rendering {url}");
    println!("  Class: {class}");
    println!(
        "  Wait selector: {}",
        policy.wait_selector.as_deref().unwrap_or("(none)")
    );
    println!();

    let driver = ChromiumDriver::new(&config.engine, &config.server.origin);
    let engine = RenderEngine::new(driver, config.engine.clone());

    let outcome = engine.render(&url, policy.wait_selector.as_deref()).await;
    engine.close().await;

    let result = outcome.with_context(|| format!("Failed to render {url}"))?;

    println!("{}", result.html);
    println!();
    println!(
        "Rendered {} in {}ms",
        format_bytes(result.html.len() as u64),
        result.render_duration_ms
    );
    Ok(())
}
