//! Conversation store and authentication seams.
//!
//! Both are external collaborators of the streaming core: the gateway
//! persists the user's turn through a [`ConversationStore`] and the client
//! persists the finished answer through one. [`AuthCheck`] gates a request
//! before any stream is opened.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Message, ThreadId};

/// Append-only message storage keyed by thread.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "memory", "file", "http").
    fn name(&self) -> &str;

    /// Append a message to the end of a thread, creating the thread if needed.
    async fn append(&self, thread_id: &ThreadId, message: Message) -> Result<(), StoreError>;

    /// All messages of a thread in arrival order. Unknown threads are empty.
    async fn list(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError>;
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `AuthCheck() -> userId | unauthenticated`.
#[async_trait]
pub trait AuthCheck: Send + Sync {
    /// Resolve the presented bearer credential, if any, to a user.
    async fn authenticate(&self, bearer: Option<&str>) -> Option<UserId>;
}
