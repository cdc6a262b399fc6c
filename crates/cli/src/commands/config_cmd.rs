//! `ripple config` — Configuration management commands.

use anyhow::Context;
use ripple_config::AppConfig;

pub fn init() -> anyhow::Result<()> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    redact(&mut config);
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

pub fn validate() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    config.validate()?;

    println!("Config OK");
    println!("   Provider:  {}", config.default_provider);
    println!("   Model:     {}", config.default_model);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!("   History:   {} {:?}", config.history.max_units, config.history.unit);
    println!("   Tools:     {}", config.tools.len());
    if !config.has_api_key() {
        println!("   Warning:   no API key set (RIPPLE_API_KEY, ANTHROPIC_API_KEY or OPENAI_API_KEY)");
    }
    Ok(())
}

fn redact(config: &mut AppConfig) {
    const HIDDEN: &str = "***";
    if config.api_key.is_some() {
        config.api_key = Some(HIDDEN.into());
    }
    if config.tool_service_key.is_some() {
        config.tool_service_key = Some(HIDDEN.into());
    }
    for token in &mut config.gateway.bearer_tokens {
        *token = HIDDEN.into();
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(HIDDEN.into());
        }
    }
}
