//! Provider trait — the model invocation adapter.
//!
//! A Provider knows how to send a prompt to an LLM and hand back a stream
//! of [`ModelEvent`]s as they arrive: token fragments, complete tool-call
//! requests and usage reports.
//!
//! Implementations: Anthropic, OpenAI-compatible endpoints, scripted stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, ToolCallRequest};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-3-5-sonnet-20241022")
    pub model: String,

    /// The prompt messages, already trimmed and annotated
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(default)]
    pub cache_read_tokens: u32,
    #[serde(default)]
    pub cache_creation_tokens: u32,
}

/// One observation from a streaming model invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A text fragment, forwarded to the client as it arrives.
    Token(String),
    /// A fully assembled tool-call request.
    ToolCall(ToolCallRequest),
    /// Token accounting, typically once near the end of the stream.
    Usage(Usage),
}

/// The receiving half of a model invocation.
///
/// The stream ends when the sender is dropped. An `Err` item aborts the run.
pub type ModelStream = mpsc::Receiver<Result<ModelEvent, ProviderError>>;

/// The core Provider trait.
///
/// The agent engine calls `invoke()` without knowing which backend is in
/// use; stubs implementing the same contract drive the tests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a stream of model events.
    async fn invoke(&self, request: ProviderRequest) -> Result<ModelStream, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest = serde_json::from_value(serde_json::json!({
            "model": "claude-3-5-sonnet-20241022",
            "messages": [],
        }))
        .unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "get_weather".into(),
            description: "Look up current weather".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string" }
                },
                "required": ["location"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("get_weather"));
        assert!(json.contains("location"));
    }
}
