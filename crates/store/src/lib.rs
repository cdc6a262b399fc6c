//! Conversation and checkpoint storage backends for Ripple.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::{FileCheckpointStore, FileConversationStore};
pub use in_memory::{InMemoryCheckpointStore, InMemoryConversationStore};

use ripple_config::AppConfig;
use ripple_core::checkpoint::CheckpointStore;
use ripple_core::conversation::ConversationStore;
use std::sync::Arc;

/// The pair of stores a deployment runs with.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

/// Build the configured backend pair. `validate()` has already rejected
/// unknown backend names; anything other than "file" falls back to memory.
pub fn build_from_config(config: &AppConfig) -> Stores {
    match config.store.backend.as_str() {
        "file" => {
            let root = config.data_dir();
            tracing::info!(path = %root.display(), "Using file store");
            Stores {
                conversations: Arc::new(FileConversationStore::new(&root)),
                checkpoints: Arc::new(FileCheckpointStore::new(&root)),
            }
        }
        _ => {
            tracing::info!("Using in-memory store");
            Stores {
                conversations: Arc::new(InMemoryConversationStore::new()),
                checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            }
        }
    }
}
