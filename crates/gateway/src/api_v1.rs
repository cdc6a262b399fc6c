//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat/stream`             — Run one turn, receive an SSE frame stream
//! - `GET  /v1/threads/{id}/messages`   — List a thread's stored messages
//! - `POST /v1/threads/{id}/messages`   — Append a message to a thread
//! - `GET  /v1/events`                  — SSE stream of domain events

use axum::{
    Router,
    body::Body,
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::{HeaderName, StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{info, warn};

use ripple_agent::RunRequest;
use ripple_core::message::{Message, Role, ThreadId};
use ripple_protocol::{ChannelSink, StreamRelay};

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat/stream", post(chat_stream_handler))
        .route(
            "/threads/{id}/messages",
            get(list_messages_handler).post(append_message_handler),
        )
        .route("/events", get(event_stream_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

/// `{messages:[{role,content}], newMessage, chatId}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    pub new_message: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl From<HistoryMessage> for Message {
    fn from(m: HistoryMessage) -> Self {
        Message::new(m.role, m.content)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize)]
pub struct ThreadMessagesResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn validate(request: &ChatStreamRequest) -> Result<(), String> {
    if request.chat_id.trim().is_empty() {
        return Err("chatId must not be empty".into());
    }
    if request.new_message.trim().is_empty() {
        return Err("newMessage must not be empty".into());
    }
    Ok(())
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/chat/stream` — run one turn and stream its events.
///
/// Validation failures are answered with 400 before any stream opens.
/// Once the stream is open, every failure arrives as an `error` frame.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatStreamRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    validate(&payload).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let thread_id = ThreadId::from(payload.chat_id);
    let history: Vec<Message> = payload.messages.into_iter().map(Message::from).collect();
    let user_message = Message::user(payload.new_message);
    info!(thread_id = %thread_id, history = history.len(), "v1/chat/stream request");

    let (sink, frames) = ChannelSink::channel(1);
    let mut relay = StreamRelay::new(sink);
    if let Some(idle) = state.keep_alive {
        relay = relay.with_keep_alive(idle);
    }

    tokio::spawn(async move {
        let agent = state.agent.clone();
        let conversations = state.conversations.clone();
        let outcome = relay
            .run(|| async move {
                conversations
                    .append(&thread_id, user_message.clone())
                    .await
                    .map_err(|e| format!("Failed to save message: {e}"))?;
                Ok::<_, String>(agent.run_stream(RunRequest {
                    thread_id,
                    history,
                    new_message: user_message,
                }))
            })
            .await;
        info!(?outcome, "Stream finished");
    });

    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}

// ── Threads ───────────────────────────────────────────────────────────────

async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadMessagesResponse>, ApiError> {
    let thread_id = ThreadId::from(id);
    let messages = state.conversations.list(&thread_id).await.map_err(|e| {
        warn!(thread_id = %thread_id, error = %e, "Listing messages failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(ThreadMessagesResponse {
        thread_id: thread_id.to_string(),
        messages,
    }))
}

async fn append_message_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<HistoryMessage>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let Json(payload) = payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let thread_id = ThreadId::from(id);
    let message = Message::from(payload);

    state
        .conversations
        .append(&thread_id, message.clone())
        .await
        .map_err(|e| {
            warn!(thread_id = %thread_id, error = %e, "Appending message failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok((StatusCode::CREATED, Json(message)))
}

// ── SSE Event Stream ──────────────────────────────────────────────────────

/// `GET /v1/events` — SSE stream of domain events (runs, model usage, tool calls).
async fn event_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.event_bus.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.name()).data(data))
        });

    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use crate::test_helpers::harness;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use ripple_core::conversation::ConversationStore;
    use ripple_core::stream::StreamEvent;
    use ripple_protocol::SseParser;
    use ripple_providers::ScriptedTurn;
    use tower::ServiceExt;

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/stream")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_events(response: Response) -> Vec<StreamEvent> {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        SseParser::new().feed(&body)
    }

    #[tokio::test]
    async fn stream_headers_and_frames() {
        let h = harness(vec![ScriptedTurn::text("Hello there")], vec![]);
        let app = build_router(h.state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [],
                "newMessage": "hi",
                "chatId": "chat-1"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "text/event-stream");
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["x-accel-buffering"], "no");

        let events = read_events(response).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Connected,
                StreamEvent::token("Hello"),
                StreamEvent::token(" there"),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn tool_turn_over_the_wire() {
        let h = harness(
            vec![
                ScriptedTurn::tool_call("c1", "get_weather", serde_json::json!({"location": "Paris"})),
                ScriptedTurn::text("It is 22C"),
            ],
            vec![],
        );
        let app = build_router(h.state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "newMessage": "weather in Paris?",
                "chatId": "chat-1"
            })))
            .await
            .unwrap();

        let tags: Vec<&str> = read_events(response).await.iter().map(|e| e.tag()).collect();
        assert_eq!(
            tags,
            vec!["connected", "tool_start", "tool_end", "token", "token", "token", "done"]
        );
    }

    #[tokio::test]
    async fn user_message_persisted_after_connect() {
        let h = harness(vec![ScriptedTurn::text("ok")], vec![]);
        let conversations = h.conversations.clone();
        let app = build_router(h.state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "newMessage": "remember me",
                "chatId": "chat-9"
            })))
            .await
            .unwrap();
        read_events(response).await;

        let stored = conversations.list(&ThreadId::from("chat-9")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[0].content, "remember me");
    }

    #[tokio::test]
    async fn model_failure_is_one_error_frame() {
        let h = harness(vec![ScriptedTurn::Fail("model down".into())], vec![]);
        let app = build_router(h.state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "newMessage": "hi",
                "chatId": "chat-1"
            })))
            .await
            .unwrap();

        let events = read_events(response).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Connected);
        assert!(matches!(&events[1], StreamEvent::Error { error } if error.contains("model down")));
    }

    #[tokio::test]
    async fn client_history_reaches_the_model() {
        let h = harness(vec![ScriptedTurn::text("ok")], vec![]);
        let provider = h.provider.clone();
        let app = build_router(h.state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ],
                "newMessage": "how are you?",
                "chatId": "chat-2"
            })))
            .await
            .unwrap();
        read_events(response).await;

        let contents: Vec<String> = provider.requests()[0]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, vec!["hi", "hello", "how are you?"]);
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let app = build_router(harness(vec![], vec![]).state);
        let response = app
            .oneshot(chat_request(serde_json::json!({
                "newMessage": "   ",
                "chatId": "chat-1"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = build_router(harness(vec![], vec![]).state);
        let response = app
            .oneshot(chat_request(serde_json::json!({ "chatId": "chat-1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unauthenticated_stream_rejected_before_opening() {
        let h = harness(vec![ScriptedTurn::text("never")], vec!["secret".into()]);
        let provider = h.provider.clone();
        let app = build_router(h.state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "newMessage": "hi",
                "chatId": "chat-1"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn thread_messages_round_trip() {
        let h = harness(vec![], vec![]);
        let app = build_router(h.state);

        let post = Request::builder()
            .method("POST")
            .uri("/v1/threads/chat-3/messages")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"role":"assistant","content":"It is 22C"}"#))
            .unwrap();
        let response = app.clone().oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let get = Request::builder()
            .uri("/v1/threads/chat-3/messages")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: ThreadMessagesResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.thread_id, "chat-3");
        assert_eq!(json.messages.len(), 1);
        assert_eq!(json.messages[0].content, "It is 22C");
    }

    #[tokio::test]
    async fn unknown_thread_is_empty() {
        let app = build_router(harness(vec![], vec![]).state);
        let req = Request::builder()
            .uri("/v1/threads/nope/messages")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: ThreadMessagesResponse = serde_json::from_slice(&body).unwrap();
        assert!(json.messages.is_empty());
    }

    #[test]
    fn request_uses_camel_case() {
        let req: ChatStreamRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"}],"newMessage":"q","chatId":"c"}"#,
        )
        .unwrap();
        assert_eq!(req.new_message, "q");
        assert_eq!(req.chat_id, "c");
        assert_eq!(req.messages[0].role, Role::User);
    }
}
