//! Client side of Ripple: an HTTP chat client for a running gateway.

pub mod client;

pub use client::{ChatClient, ClientError, HttpConversationStore};
