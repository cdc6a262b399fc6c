//! Domain event system — decoupled observation of what runs are doing.
//!
//! These are operator-facing events (usage, tool latency, failures), not the
//! client wire protocol; see [`crate::stream::StreamEvent`] for that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A run started for a thread
    RunStarted {
        thread_id: String,
        run_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The model finished one invocation
    ResponseGenerated {
        thread_id: String,
        model: String,
        tokens_used: u32,
        cache_read_tokens: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run ended with a fatal error
    RunFailed {
        thread_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A run completed
    RunCompleted {
        thread_id: String,
        steps: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// SSE event name for the operator stream.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::RunFailed { .. } => "run_failed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
