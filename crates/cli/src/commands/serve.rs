//! `ripple serve` — Start the HTTP gateway.

use anyhow::Context;
use ripple_config::AppConfig;

pub async fn run(
    port: Option<u16>,
    host: Option<String>,
    provider: Option<String>,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(provider) = provider {
        config.default_provider = provider;
    }

    if !config.has_api_key() && config.default_provider != "scripted" {
        tracing::warn!(
            provider = %config.default_provider,
            "No API key configured, model calls will fail (set RIPPLE_API_KEY or use --provider scripted)"
        );
    }

    println!("Ripple gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {}", config.default_provider);
    println!("   Store:     {}", config.store.backend);

    ripple_gateway::start(config).await?;
    Ok(())
}
