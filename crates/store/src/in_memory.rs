//! In-memory backends — useful for testing and single-process deployments.

use async_trait::async_trait;
use ripple_core::checkpoint::{CheckpointStore, GraphState};
use ripple_core::conversation::ConversationStore;
use ripple_core::error::StoreError;
use ripple_core::message::{Message, Thread, ThreadId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Conversation threads held in a map. Lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    threads: Arc<RwLock<HashMap<ThreadId, Thread>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads that have at least one message.
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, thread_id: &ThreadId, message: Message) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.clone())
            .or_insert_with(|| Thread::new(thread_id.clone()))
            .push(message);
        Ok(())
    }

    async fn list(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }
}

/// Checkpoints keyed by thread id, last writer wins.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    states: Arc<RwLock<HashMap<ThreadId, GraphState>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<GraphState>, StoreError> {
        Ok(self.states.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &ThreadId, state: GraphState) -> Result<(), StoreError> {
        self.states.write().await.insert(thread_id.clone(), state);
        Ok(())
    }
}
