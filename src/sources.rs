use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::source::SourceRegistry;

/// Prints every configured source instance, enabled or not.
pub fn list_sources(config: &Config) -> Result<()> {
    let fetcher = Arc::new(Fetcher::new(&config.fetch)?);
    let registry = SourceRegistry::from_config(config, fetcher);

    println!("{:<28} {:<9} DESCRIPTION", "SOURCE", "STATUS");

    for (name, cfg) in &config.sources.reddit {
        print_row(&registry, &format!("reddit:{}", name), cfg.enabled);
    }
    for (name, cfg) in &config.sources.play_store {
        print_row(&registry, &format!("play_store:{}", name), cfg.enabled);
    }

    if config.sources.reddit.is_empty() && config.sources.play_store.is_empty() {
        println!("(no sources configured)");
    }

    Ok(())
}

fn print_row(registry: &SourceRegistry, label: &str, enabled: bool) {
    let description = registry
        .find(label)
        .map(|s| s.description().to_string())
        .unwrap_or_default();
    let status = if enabled { "enabled" } else { "disabled" };
    println!("{:<28} {:<9} {}", label, status, description);
}
