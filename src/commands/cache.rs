use anyhow::Result;

use rendergate::cache::RenderCache;
use rendergate::config::Config;

/// Remove every cached snapshot under the configured prefix
pub async fn cache_clear(config: &Config) -> Result<()> {
    if !config.cache.enabled {
        println!("Cache is disabled (set CACHE_ENABLED=true or cache.enabled in the config file).");
        return Ok(());
    }

    let cache = RenderCache::from_config(&config.cache).await;
    let removed = cache.clear_all().await;
    cache.close().await;

    println!(
        "Removed {removed} entries under prefix '{}'",
        config.cache.key_prefix
    );
    Ok(())
}
