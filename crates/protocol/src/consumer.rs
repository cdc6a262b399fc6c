//! Stream consumer — folds parsed events into client-side conversation state.
//!
//! The consumer owns the local view of one thread. Starting a turn inserts
//! the user's message optimistically (with a `temp-` id) so it renders
//! before the server confirms anything. `Done` finalizes the streamed text
//! as an assistant message and persists it; `Error` rolls the optimistic
//! state back.

use ripple_core::conversation::ConversationStore;
use ripple_core::error::StoreError;
use ripple_core::message::{Message, ThreadId};
use ripple_core::stream::StreamEvent;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix marking a message that exists only locally.
pub const OPTIMISTIC_ID_PREFIX: &str = "temp-";

/// One tool call as the user sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub tool: String,
    pub input: serde_json::Value,
    /// `None` while the call is still running.
    pub output: Option<serde_json::Value>,
}

impl ToolRecord {
    pub fn is_pending(&self) -> bool {
        self.output.is_none()
    }

    /// Display form: "processing…" until the output arrives.
    pub fn render(&self) -> String {
        match &self.output {
            None => format!("{}: processing...", self.tool),
            Some(serde_json::Value::String(s)) => format!("{}: {s}", self.tool),
            Some(other) => format!("{}: {other}", self.tool),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    Idle,
    Streaming,
    Completed,
    Failed,
}

/// What changed after handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerUpdate {
    Nothing,
    /// The accumulated text so far.
    Partial(String),
    ToolStarted(ToolRecord),
    ToolFinished(ToolRecord),
    /// The run failed; optimistic state was discarded.
    Failed(String),
    /// The final assistant message, already persisted.
    Completed(Message),
}

pub struct StreamConsumer {
    store: Arc<dyn ConversationStore>,
    thread_id: ThreadId,
    messages: Vec<Message>,
    text: String,
    tools: Vec<ToolRecord>,
    optimistic: Option<String>,
    error: Option<String>,
    status: ConsumerStatus,
}

impl StreamConsumer {
    pub fn new(store: Arc<dyn ConversationStore>, thread_id: ThreadId, history: Vec<Message>) -> Self {
        Self {
            store,
            thread_id,
            messages: history,
            text: String::new(),
            tools: Vec::new(),
            optimistic: None,
            error: None,
            status: ConsumerStatus::Idle,
        }
    }

    /// Start a turn: reset run state and insert the user's message locally.
    pub fn begin(&mut self, user_text: &str) -> &Message {
        self.text.clear();
        self.tools.clear();
        self.error = None;
        self.status = ConsumerStatus::Streaming;

        let mut message = Message::user(user_text);
        message.id = format!("{OPTIMISTIC_ID_PREFIX}{}", uuid::Uuid::new_v4());
        self.optimistic = Some(message.id.clone());
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Apply one event.
    ///
    /// The only fallible step is persisting the final message on `Done`.
    pub async fn handle(&mut self, event: StreamEvent) -> Result<ConsumerUpdate, StoreError> {
        if matches!(self.status, ConsumerStatus::Completed | ConsumerStatus::Failed) {
            debug!(tag = event.tag(), "Ignoring event after terminal state");
            return Ok(ConsumerUpdate::Nothing);
        }

        let update = match event {
            StreamEvent::Connected => {
                self.status = ConsumerStatus::Streaming;
                ConsumerUpdate::Nothing
            }
            StreamEvent::Token { token } => {
                self.text.push_str(&token);
                ConsumerUpdate::Partial(self.text.clone())
            }
            StreamEvent::ToolStart { tool, input } => {
                let record = ToolRecord {
                    tool,
                    input,
                    output: None,
                };
                self.tools.push(record.clone());
                ConsumerUpdate::ToolStarted(record)
            }
            StreamEvent::ToolEnd { tool, output } => {
                // Correlates with the most recent open call only.
                match self.tools.iter_mut().rev().find(|r| r.is_pending()) {
                    Some(record) => {
                        if record.tool != tool {
                            warn!(started = %record.tool, ended = %tool, "Tool end does not match open call");
                        }
                        record.output = Some(output);
                        ConsumerUpdate::ToolFinished(record.clone())
                    }
                    None => {
                        warn!(%tool, "Tool end without a pending start");
                        ConsumerUpdate::Nothing
                    }
                }
            }
            StreamEvent::Error { error } => {
                self.rollback();
                self.error = Some(error.clone());
                self.status = ConsumerStatus::Failed;
                ConsumerUpdate::Failed(error)
            }
            StreamEvent::Done => return self.finalize().await,
        };
        Ok(update)
    }

    /// Persist the streamed text as the assistant's message.
    ///
    /// When the store refuses it the turn fails like an `Error` event, except
    /// that the streamed text stays readable through [`partial_text`](Self::partial_text).
    async fn finalize(&mut self) -> Result<ConsumerUpdate, StoreError> {
        let message = Message::assistant(self.text.clone());
        if let Err(e) = self.store.append(&self.thread_id, message.clone()).await {
            warn!(thread_id = %self.thread_id, error = %e, "Persisting assistant message failed");
            if let Some(id) = self.optimistic.take() {
                self.messages.retain(|m| m.id != id);
            }
            self.tools.clear();
            self.error = Some(e.to_string());
            self.status = ConsumerStatus::Failed;
            return Err(e);
        }
        debug!(thread_id = %self.thread_id, chars = message.content.len(), "Assistant message persisted");

        self.text.clear();
        self.messages.push(message.clone());
        self.optimistic = None;
        self.tools.clear();
        self.status = ConsumerStatus::Completed;
        Ok(ConsumerUpdate::Completed(message))
    }

    fn rollback(&mut self) {
        if let Some(id) = self.optimistic.take() {
            self.messages.retain(|m| m.id != id);
        }
        self.text.clear();
        self.tools.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Text streamed so far in the current turn.
    pub fn partial_text(&self) -> &str {
        &self.text
    }

    pub fn tools(&self) -> &[ToolRecord] {
        &self.tools
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> ConsumerStatus {
        self.status
    }
}
