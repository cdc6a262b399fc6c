//! # Ripple Core
//!
//! Domain types, traits, and error definitions for the Ripple streaming
//! agent runtime. This crate has **no framework dependencies**: it defines
//! the model every other crate implements against.
//!
//! Each external collaborator is a trait here (model provider, tool
//! executor, checkpoint store, conversation store, auth check), so
//! implementations can be swapped through configuration and replaced with
//! stubs in tests.

pub mod checkpoint;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use checkpoint::{CheckpointStore, GraphState};
pub use conversation::{AuthCheck, ConversationStore, UserId};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{CacheControl, Message, Role, Thread, ThreadId, ToolCallRequest};
pub use provider::{ModelEvent, ModelStream, Provider, ProviderRequest, ToolDefinition, Usage};
pub use stream::StreamEvent;
pub use tool::{Tool, ToolExecutor, ToolRegistry};
