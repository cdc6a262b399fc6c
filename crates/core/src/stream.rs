//! Wire-level stream events shared by the server relay and the client parser.
//!
//! Frames look like:
//!
//! ```text
//! data: {"type":"token","token":"Hel"}
//!
//! data: [DONE]
//!
//! ```
//!
//! `Done` never travels as JSON; it is the [`SSE_DONE_MESSAGE`] sentinel.

use serde::{Deserialize, Serialize};

/// Prefix of every data frame.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Literal payload marking successful completion.
pub const SSE_DONE_MESSAGE: &str = "[DONE]";

/// Terminates each frame (a blank line).
pub const SSE_LINE_DELIMITER: &str = "\n\n";

/// Every event a run can put on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Handshake; written before any engine work starts.
    Connected,

    /// A model token fragment.
    Token { token: String },

    /// A tool call is starting.
    ToolStart {
        tool: String,
        input: serde_json::Value,
    },

    /// The most recently started tool call finished.
    ToolEnd {
        tool: String,
        output: serde_json::Value,
    },

    /// The run failed. Terminal.
    Error { error: String },

    /// The run finished successfully. Terminal.
    Done,
}

impl StreamEvent {
    /// Wire tags the parser accepts. Anything else is dropped.
    pub const KNOWN_TAGS: [&'static str; 6] =
        ["connected", "token", "tool_start", "tool_end", "error", "done"];

    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// The `type` tag for this event.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Token { .. } => "token",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// `Error` and `Done` end a run; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_serializes_as_bare_tag() {
        let json = serde_json::to_string(&StreamEvent::Connected).unwrap();
        assert_eq!(json, r#"{"type":"connected"}"#);
    }

    #[test]
    fn token_wire_shape() {
        let json = serde_json::to_string(&StreamEvent::token("Hel")).unwrap();
        assert_eq!(json, r#"{"type":"token","token":"Hel"}"#);
    }

    #[test]
    fn tool_start_wire_shape() {
        let event = StreamEvent::ToolStart {
            tool: "get_weather".into(),
            input: serde_json::json!({"location": "Paris"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_start""#));
        assert!(json.contains(r#""tool":"get_weather""#));
        assert!(json.contains(r#""input":{"location":"Paris"}"#));
    }

    #[test]
    fn tags_match_serialization() {
        let events = [
            StreamEvent::Connected,
            StreamEvent::token("x"),
            StreamEvent::ToolStart {
                tool: "a".into(),
                input: serde_json::Value::Null,
            },
            StreamEvent::ToolEnd {
                tool: "a".into(),
                output: serde_json::Value::Null,
            },
            StreamEvent::error("x"),
            StreamEvent::Done,
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.tag());
            assert!(StreamEvent::KNOWN_TAGS.contains(&event.tag()));
        }
    }

    #[test]
    fn terminal_events() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::error("boom").is_terminal());
        assert!(!StreamEvent::Connected.is_terminal());
        assert!(!StreamEvent::token("x").is_terminal());
    }
}
