//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any endpoint exposing `/chat/completions` with SSE streaming.
//!
//! Cache breakpoints are ignored here: these APIs cache prefixes
//! automatically or not at all.

use async_trait::async_trait;
use futures::StreamExt;
use ripple_core::error::ProviderError;
use ripple_core::message::{Message, Role, ToolCallRequest};
use ripple_core::provider::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::lines::LineBuffer;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                    Role::Tool => "tool",
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function",
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.input.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function",
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl ripple_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: ProviderRequest) -> Result<ModelStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::new();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    let items = if data == "[DONE]" {
                        state.finish()
                    } else {
                        match serde_json::from_str::<StreamResponse>(data) {
                            Ok(chunk) => state.handle(chunk),
                            Err(e) => {
                                trace!(provider = %provider_name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                                continue;
                            }
                        }
                    };

                    for item in items {
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                    if state.finished {
                        return;
                    }
                }
            }

            for item in state.finish() {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

type Item = Result<ModelEvent, ProviderError>;

/// Incremental decoder for chat-completion chunks.
///
/// Tool-call deltas arrive keyed by index and are emitted, in index order,
/// once the choice reports a finish reason.
#[derive(Default)]
struct StreamState {
    tools: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
    finished: bool,
}

impl StreamState {
    fn handle(&mut self, chunk: StreamResponse) -> Vec<Item> {
        let mut out = Vec::new();

        if let Some(choice) = chunk.choices.into_iter().next() {
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let acc = self.tools.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    acc.id = id;
                }
                if let Some(func) = delta.function {
                    if let Some(name) = func.name {
                        acc.name = name;
                    }
                    if let Some(args) = func.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }

            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(Ok(ModelEvent::Token(content)));
            }

            if choice.finish_reason.is_some() {
                out.extend(self.drain_tools());
            }
        }

        if let Some(u) = chunk.usage {
            self.usage = Some(Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
                cache_read_tokens: u
                    .prompt_tokens_details
                    .map(|d| d.cached_tokens)
                    .unwrap_or(0),
                cache_creation_tokens: 0,
            });
        }

        out
    }

    fn drain_tools(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.tools)
            .into_values()
            .map(|acc| acc.into_request().map(ModelEvent::ToolCall))
            .collect()
    }

    fn finish(&mut self) -> Vec<Item> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut out = self.drain_tools();
        if let Some(usage) = self.usage.take() {
            out.push(Ok(ModelEvent::Usage(usage)));
        }
        out
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: &'static str,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_request(self) -> Result<ToolCallRequest, ProviderError> {
        let input = if self.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&self.arguments).map_err(|e| {
                ProviderError::StreamInterrupted(format!(
                    "malformed arguments for tool '{}': {e}",
                    self.name
                ))
            })?
        };
        Ok(ToolCallRequest {
            id: self.id,
            name: self.name,
            input,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::Provider;
    use serde_json::json;

    fn chunk(v: serde_json::Value) -> StreamResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://localhost:8000/v1/", "k");
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![ToolCallRequest {
            id: "call_1".into(),
            name: "get_weather".into(),
            input: json!({"location": "Paris"}),
        }];
        let result = Message::tool_result("call_1", "22C");

        let api = OpenAiCompatProvider::to_api_messages(&[msg, result]);
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json[0]["tool_calls"][0]["type"], "function");
        assert_eq!(
            json[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"location":"Paris"}"#
        );
        assert_eq!(json[1]["role"], "tool");
        assert_eq!(json[1]["tool_call_id"], "call_1");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "get_weather".into(),
            description: "Weather".into(),
            parameters: json!({"type": "object"}),
        }];
        let api = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api[0].function.name, "get_weather");
        assert_eq!(api[0].r#type, "function");
    }

    #[test]
    fn content_deltas_become_tokens() {
        let mut state = StreamState::default();
        let out = state.handle(chunk(json!({"choices": [{"delta": {"content": "Hi"}}]})));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &ModelEvent::Token("Hi".into()));

        let empty = state.handle(chunk(json!({"choices": [{"delta": {"content": ""}}]})));
        assert!(empty.is_empty());
    }

    #[test]
    fn tool_call_deltas_assembled_on_finish() {
        let mut state = StreamState::default();
        state.handle(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 1, "id": "call_b", "function": {"name": "second", "arguments": ""}},
            {"index": 0, "id": "call_a", "function": {"name": "first", "arguments": "{\"x\":"}}
        ]}}]})));
        state.handle(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "1}"}}
        ]}}]})));
        let out = state.handle(chunk(
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ));

        let calls: Vec<_> = out
            .into_iter()
            .map(|r| match r.unwrap() {
                ModelEvent::ToolCall(c) => c,
                other => panic!("expected tool call, got {other:?}"),
            })
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[0].input, json!({"x": 1}));
        assert_eq!(calls[1].name, "second");
        assert_eq!(calls[1].input, json!({}));
    }

    #[test]
    fn usage_reported_on_finish() {
        let mut state = StreamState::default();
        state.handle(chunk(json!({"choices": [], "usage": {
            "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15,
            "prompt_tokens_details": {"cached_tokens": 8}
        }})));
        let out = state.finish();
        match out[0].as_ref().unwrap() {
            ModelEvent::Usage(u) => {
                assert_eq!(u.total_tokens, 15);
                assert_eq!(u.cache_read_tokens, 8);
            }
            other => panic!("expected usage, got {other:?}"),
        }
        assert!(state.finish().is_empty());
    }

    #[test]
    fn malformed_tool_arguments_are_an_error() {
        let mut state = StreamState::default();
        let out = state.handle(chunk(json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "c", "function": {"name": "broken", "arguments": "{oops"}}
        ]}, "finish_reason": "tool_calls"}]})));
        assert!(matches!(out[0], Err(ProviderError::StreamInterrupted(_))));
    }
}
