//! LLM Provider implementations for Ripple.
//!
//! All providers implement the `ripple_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod anthropic;
mod lines;
pub mod openai_compat;
pub mod router;
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config, model_for};
pub use scripted::{ScriptedProvider, ScriptedTurn};
