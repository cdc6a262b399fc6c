//! Scripted provider — replays canned model turns.
//!
//! Each call to `invoke` consumes the next [`ScriptedTurn`]. Used by tests
//! across the workspace and by `ripple serve --provider scripted` for
//! offline demos.

use async_trait::async_trait;
use ripple_core::error::ProviderError;
use ripple_core::message::ToolCallRequest;
use ripple_core::provider::{ModelEvent, ModelStream, Provider, ProviderRequest, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// One canned model invocation.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these events, then end the stream.
    Events(Vec<ModelEvent>),
    /// Fail the invocation outright.
    Fail(String),
    /// Stream these events, then interrupt the stream with an error.
    FailAfter(Vec<ModelEvent>, String),
}

impl ScriptedTurn {
    /// A plain text reply, streamed one word at a time.
    pub fn text(reply: &str) -> Self {
        let mut events = Vec::new();
        for (i, word) in reply.split(' ').enumerate() {
            let token = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            events.push(ModelEvent::Token(token));
        }
        Self::Events(events)
    }

    /// A single tool-call request with no text.
    pub fn tool_call(id: &str, name: &str, input: serde_json::Value) -> Self {
        Self::Events(vec![ModelEvent::ToolCall(ToolCallRequest {
            id: id.into(),
            name: name.into(),
            input,
        })])
    }
}

/// A provider that plays back a fixed script.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
    fallback: Option<String>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
            fallback: None,
        }
    }

    /// Pause before every streamed event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reply with this text once the script is exhausted instead of failing.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_turn(&self) -> Option<ScriptedTurn> {
        self.turns.lock().ok().and_then(|mut t| t.pop_front())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: ProviderRequest) -> Result<ModelStream, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let turn = match (self.next_turn(), &self.fallback) {
            (Some(turn), _) => turn,
            (None, Some(reply)) => ScriptedTurn::text(reply),
            (None, None) => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "scripted provider has no turns left".into(),
                });
            }
        };

        let (events, failure) = match turn {
            ScriptedTurn::Fail(message) => {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message,
                });
            }
            ScriptedTurn::Events(events) => (events, None),
            ScriptedTurn::FailAfter(events, message) => (events, Some(message)),
        };

        let (tx, rx) = mpsc::channel(16);
        let delay = self.delay;
        tokio::spawn(async move {
            let total = events.len() as u32;
            for event in events {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            let last = match failure {
                Some(message) => Err(ProviderError::StreamInterrupted(message)),
                None => Ok(ModelEvent::Usage(Usage {
                    completion_tokens: total,
                    total_tokens: total,
                    ..Usage::default()
                })),
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }
}
