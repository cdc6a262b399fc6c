//! Tool adapters for Ripple.
//!
//! Tools are not implemented in-process: each configured tool forwards its
//! calls to a remote tool service over HTTP.

pub mod remote;

pub use remote::RemoteTool;

use ripple_config::AppConfig;
use ripple_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Build a registry from the `[[tools]]` entries of the configuration.
///
/// A tool without an explicit `endpoint` is served at
/// `{tool_service_url}/{name}`; `validate()` guarantees one of them is set.
pub fn registry_from_config(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for tool in &config.tools {
        let endpoint = match (&tool.endpoint, &config.tool_service_url) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(base)) => format!("{}/{}", base.trim_end_matches('/'), tool.name),
            (None, None) => {
                tracing::warn!(tool = %tool.name, "Skipping tool with no endpoint");
                continue;
            }
        };

        let mut remote = RemoteTool::new(&tool.name, &tool.description, endpoint)
            .with_parameters(tool.parameters.clone())
            .with_timeout(Duration::from_secs(tool.timeout_secs));
        if let Some(key) = &config.tool_service_key {
            remote = remote.with_api_key(key);
        }
        registry.register(Arc::new(remote));
    }

    tracing::debug!(tools = ?registry.names(), "Tool registry built");
    registry
}
