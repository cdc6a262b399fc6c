//! Prompt history shaping: trimming to a budget and placing cache hints.

pub mod cache_hints;
pub mod token;
pub mod trimmer;

pub use cache_hints::annotate;
pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
pub use trimmer::{TrimConfig, TrimReport, trim_messages, trim_with_report};
