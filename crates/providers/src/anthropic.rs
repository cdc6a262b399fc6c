//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level content blocks
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Prompt caching: messages carrying a cache breakpoint are sent with
//!   `cache_control`, and the prompt-caching beta header is attached
//! - Streaming via SSE with `content_block_delta` events

use async_trait::async_trait;
use futures::StreamExt;
use ripple_core::error::ProviderError;
use ripple_core::message::{CacheControl, Message, Role, ToolCallRequest};
use ripple_core::provider::*;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::lines::LineBuffer;
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Forward cache breakpoints and send the prompt-caching beta header.
    prompt_caching: bool,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            prompt_caching: true,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable or disable prompt caching.
    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.prompt_caching = enabled;
        self
    }

    fn cache_control(&self, msg: &Message) -> Option<CacheControl> {
        if self.prompt_caching {
            msg.cache_control
        } else {
            None
        }
    }

    /// Split system messages into top-level system blocks.
    /// Anthropic puts the system prompt outside the message list.
    fn extract_system<'a>(&self, messages: &'a [Message]) -> (Vec<SystemBlock>, Vec<&'a Message>) {
        let mut system = Vec::new();
        let mut rest = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system.push(SystemBlock {
                    kind: "text",
                    text: msg.content.clone(),
                    cache_control: self.cache_control(msg),
                }),
                _ => rest.push(msg),
            }
        }

        (system, rest)
    }

    /// Convert messages to Anthropic API format with content blocks.
    ///
    /// Consecutive tool results are merged into a single user turn, which
    /// the API requires after an assistant turn with several `tool_use`s.
    fn to_api_messages(&self, messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            let cache_control = self.cache_control(msg);
            match msg.role {
                Role::User => result.push(AnthropicMessage {
                    role: "user",
                    content: vec![ContentBlock::Text {
                        text: msg.content.clone(),
                        cache_control,
                    }],
                }),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() || msg.tool_calls.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                            cache_control: None,
                        });
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: tc.input.clone(),
                        });
                    }
                    set_last_cache_control(&mut blocks, cache_control);
                    result.push(AnthropicMessage {
                        role: "assistant",
                        content: blocks,
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: msg.is_error,
                        cache_control,
                    };
                    match result.last_mut() {
                        Some(prev)
                            if prev.role == "user"
                                && prev
                                    .content
                                    .iter()
                                    .all(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
                        {
                            prev.content.push(block);
                        }
                        _ => result.push(AnthropicMessage {
                            role: "user",
                            content: vec![block],
                        }),
                    }
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn build_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let (system, messages) = self.extract_system(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": self.to_api_messages(&messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "stream": true,
        });

        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

fn set_last_cache_control(blocks: &mut [ContentBlock], value: Option<CacheControl>) {
    if value.is_none() {
        return;
    }
    match blocks.last_mut() {
        Some(ContentBlock::Text { cache_control, .. })
        | Some(ContentBlock::ToolResult { cache_control, .. }) => *cache_control = value,
        // tool_use blocks take no breakpoint here; the next user turn carries it
        _ => {}
    }
}

#[async_trait]
impl ripple_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: ProviderRequest) -> Result<ModelStream, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "no Anthropic API key (set ANTHROPIC_API_KEY)".into(),
            ));
        }

        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);

        debug!(provider = "anthropic", model = %request.model, messages = request.messages.len(), "Sending streaming request");

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");
        if self.prompt_caching {
            builder = builder.header("anthropic-beta", PROMPT_CACHING_BETA);
        }

        let response = builder
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
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = mpsc::channel(64);

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
                        // `event:` lines duplicate the JSON `type`; comments are pings
                        continue;
                    };

                    let event: serde_json::Value = match serde_json::from_str(data.trim()) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    for item in state.handle(&event) {
                        if tx.send(item).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                    if state.finished {
                        return;
                    }
                }
            }

            // Stream ended without message_stop
            for item in state.finish() {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(!self.api_key.is_empty())
    }
}

/// Incremental decoder for Anthropic's streaming event objects.
#[derive(Default)]
struct StreamState {
    tool: Option<PendingToolUse>,
    usage: Usage,
    finished: bool,
}

struct PendingToolUse {
    id: String,
    name: String,
    args: String,
}

impl PendingToolUse {
    fn into_request(self) -> Result<ToolCallRequest, ProviderError> {
        let input = if self.args.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&self.args).map_err(|e| {
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

type Item = Result<ModelEvent, ProviderError>;

impl StreamState {
    fn handle(&mut self, event: &serde_json::Value) -> Vec<Item> {
        let mut out = Vec::new();
        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                let usage = &event["message"]["usage"];
                self.usage.prompt_tokens = as_u32(&usage["input_tokens"]);
                self.usage.cache_read_tokens = as_u32(&usage["cache_read_input_tokens"]);
                self.usage.cache_creation_tokens = as_u32(&usage["cache_creation_input_tokens"]);
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    out.extend(self.flush_tool());
                    self.tool = Some(PendingToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        args: String::new(),
                    });
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            if !text.is_empty() {
                                out.push(Ok(ModelEvent::Token(text.to_string())));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let (Some(tool), Some(partial)) =
                            (self.tool.as_mut(), delta["partial_json"].as_str())
                        {
                            tool.args.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => out.extend(self.flush_tool()),
            "message_delta" => {
                let output = as_u32(&event["usage"]["output_tokens"]);
                if output > 0 {
                    self.usage.completion_tokens = output;
                }
            }
            "message_stop" => out.extend(self.finish()),
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown streaming error")
                    .to_string();
                out.push(Err(ProviderError::StreamInterrupted(message)));
                self.finished = true;
            }
            _ => {}
        }
        out
    }

    fn flush_tool(&mut self) -> Option<Item> {
        self.tool
            .take()
            .map(|t| t.into_request().map(ModelEvent::ToolCall))
    }

    fn finish(&mut self) -> Vec<Item> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut out: Vec<Item> = self.flush_tool().into_iter().collect();
        self.usage.total_tokens = self.usage.prompt_tokens + self.usage.completion_tokens;
        out.push(Ok(ModelEvent::Usage(std::mem::take(&mut self.usage))));
        out
    }
}

fn as_u32(v: &serde_json::Value) -> u32 {
    v.as_u64().unwrap_or(0) as u32
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}
