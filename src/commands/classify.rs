use anyhow::Result;

use rendergate::config::Config;

/// Print how a User-Agent is classified
pub fn classify(config: &Config, user_agent: &str) -> Result<()> {
    let classifier = config.classifier();
    let class = classifier.classify(user_agent);

    println!("User-Agent: {user_agent}");
    println!("  Class:   {class}");
    if class.is_bot() {
        println!("  Tag:     {}", class.cache_tag());
        println!("  Header:  X-Crawler-Type: {}", class.header_label());
    }
    match classifier.detect(user_agent) {
        Some(sig) => println!("  Crawler: {} (token \"{}\")", sig.name, sig.token),
        None => println!("  Crawler: none (served by redirect)"),
    }
    Ok(())
}
