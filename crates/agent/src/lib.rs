//! The Ripple agent engine.
//!
//! [`AgentGraph`] runs the reason/act loop for one thread at a time and
//! streams its progress as [`StreamEvent`](ripple_core::stream::StreamEvent)s.
//! The [`history`] module bounds and annotates what each model call sees.

pub mod graph;
pub mod history;
pub mod testing;

pub use graph::{AgentGraph, Node, RunRequest, Transition};
pub use history::{TrimConfig, TrimReport, annotate, trim_messages, trim_with_report};
