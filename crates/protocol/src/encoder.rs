//! Event → frame encoding.

use ripple_core::stream::{SSE_DATA_PREFIX, SSE_DONE_MESSAGE, SSE_LINE_DELIMITER, StreamEvent};

/// SSE comment written while the engine is idle. Parsers ignore it.
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

/// Encode one event as `data: <payload>\n\n`.
///
/// `Done` is the `[DONE]` sentinel; everything else is single-line JSON.
pub fn encode_frame(event: &StreamEvent) -> String {
    let payload = match event {
        StreamEvent::Done => SSE_DONE_MESSAGE.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|e| {
            tracing::warn!(error = %e, tag = other.tag(), "Event serialization failed");
            serde_json::json!({ "type": "error", "error": "Failed to encode event" }).to_string()
        }),
    };
    format!("{SSE_DATA_PREFIX}{payload}{SSE_LINE_DELIMITER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_frame() {
        assert_eq!(
            encode_frame(&StreamEvent::Connected),
            "data: {\"type\":\"connected\"}\n\n"
        );
    }

    #[test]
    fn done_is_sentinel() {
        assert_eq!(encode_frame(&StreamEvent::Done), "data: [DONE]\n\n");
    }

    #[test]
    fn payload_stays_on_one_line() {
        let frame = encode_frame(&StreamEvent::token("line one\nline two"));
        assert_eq!(frame.matches('\n').count(), 2);
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains(r#"line one\nline two"#));
    }

    #[test]
    fn tool_end_carries_output() {
        let frame = encode_frame(&StreamEvent::ToolEnd {
            tool: "get_weather".into(),
            output: serde_json::json!("22C"),
        });
        assert_eq!(
            frame,
            "data: {\"type\":\"tool_end\",\"tool\":\"get_weather\",\"output\":\"22C\"}\n\n"
        );
    }
}
