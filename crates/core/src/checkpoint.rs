//! Per-thread checkpoints of agent engine state.
//!
//! The engine treats the store opaquely: it loads a snapshot at the start
//! of a run and saves one after every state transition. Durability is the
//! implementation's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{Message, ThreadId};

/// Snapshot of one run of the agent graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    /// Working message sequence: prior history plus everything this run
    /// appended (assistant turns with tool calls, tool results, final answer).
    pub messages: Vec<Message>,

    /// Text accumulated from the in-flight model response.
    #[serde(default)]
    pub response: String,

    /// Number of AGENT visits so far in this run.
    #[serde(default)]
    pub steps: u32,

    /// When this snapshot was taken.
    pub updated_at: DateTime<Utc>,
}

impl GraphState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            response: String::new(),
            steps: 0,
            updated_at: Utc::now(),
        }
    }
}

/// `load(threadId) -> State | absent`, `save(threadId, State)`.
///
/// Implementations need only guarantee last-writer-wins per key.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<GraphState>, StoreError>;

    async fn save(&self, thread_id: &ThreadId, state: GraphState) -> Result<(), StoreError>;
}
