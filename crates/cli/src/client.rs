//! HTTP chat client.
//!
//! [`ChatClient`] posts a turn to `POST /v1/chat/stream`, decodes the
//! response body with [`SseParser`] as the bytes arrive, and drives a
//! [`StreamConsumer`]. [`HttpConversationStore`] persists through the
//! gateway's thread endpoints so the consumer can save the final answer.

use async_trait::async_trait;
use futures::StreamExt;
use ripple_core::conversation::ConversationStore;
use ripple_core::error::StoreError;
use ripple_core::message::{Message, Role, ThreadId};
use ripple_core::stream::StreamEvent;
use ripple_protocol::{ConsumerStatus, ConsumerUpdate, SseParser, StreamConsumer};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// `{role, content}` as the gateway accepts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatStreamBody<'a> {
    messages: Vec<WireMessage>,
    new_message: &'a str,
    chat_id: &'a str,
}

#[derive(Deserialize)]
struct ThreadMessages {
    messages: Vec<Message>,
}

#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// Stored messages of a thread.
    pub async fn history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v1/threads/{thread_id}/messages"))
            .send()
            .await?;
        let body: ThreadMessages = Self::check(response).await?.json().await?;
        Ok(body.messages)
    }

    /// Append a message to a thread.
    pub async fn append(&self, thread_id: &ThreadId, message: &Message) -> Result<(), ClientError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/v1/threads/{thread_id}/messages"))
            .json(&WireMessage {
                role: message.role,
                content: message.content.clone(),
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Open a stream for one turn and return its parsed events.
    ///
    /// Rejections (bad request, unauthorized) surface here, before any
    /// event is produced. Transport failures mid-stream arrive as a final
    /// `Error` event.
    pub async fn open_stream(
        &self,
        thread_id: &ThreadId,
        history: &[Message],
        text: &str,
    ) -> Result<mpsc::Receiver<StreamEvent>, ClientError> {
        let body = ChatStreamBody {
            messages: history
                .iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            new_message: text,
            chat_id: thread_id.as_str(),
        };

        let response = self
            .request(reqwest::Method::POST, "/v1/chat/stream")
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut chunks = response.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                let events = match chunk {
                    Ok(bytes) => parser.feed(&bytes),
                    Err(e) => {
                        warn!(error = %e, "Stream read failed");
                        vec![StreamEvent::error(format!("Stream interrupted: {e}"))]
                    }
                };
                for event in events {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() || terminal {
                        return;
                    }
                }
            }
            for event in parser.finish() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    /// Run one turn through `consumer`, reporting every update.
    ///
    /// The history sent to the gateway is the consumer's view before the
    /// optimistic user message is added.
    pub async fn send_turn<F>(
        &self,
        consumer: &mut StreamConsumer,
        thread_id: &ThreadId,
        text: &str,
        mut on_update: F,
    ) -> Result<ConsumerStatus, ClientError>
    where
        F: FnMut(&ConsumerUpdate),
    {
        let history = consumer.messages().to_vec();
        consumer.begin(text);

        let mut events = match self.open_stream(thread_id, &history, text).await {
            Ok(events) => events,
            Err(e) => {
                let update = consumer.handle(StreamEvent::error(e.to_string())).await?;
                on_update(&update);
                return Err(e);
            }
        };

        while let Some(event) = events.recv().await {
            debug!(tag = event.tag(), "Event received");
            let update = consumer.handle(event).await?;
            on_update(&update);
            if consumer.status() != ConsumerStatus::Streaming {
                break;
            }
        }

        if consumer.status() == ConsumerStatus::Streaming {
            let update = consumer
                .handle(StreamEvent::error("Stream ended unexpectedly"))
                .await?;
            on_update(&update);
        }
        Ok(consumer.status())
    }
}

/// [`ConversationStore`] backed by a gateway's thread endpoints.
pub struct HttpConversationStore {
    client: ChatClient,
}

impl HttpConversationStore {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

fn store_error(e: ClientError) -> StoreError {
    match e {
        ClientError::Store(e) => e,
        other => StoreError::Storage(other.to_string()),
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn append(&self, thread_id: &ThreadId, message: Message) -> Result<(), StoreError> {
        self.client
            .append(thread_id, &message)
            .await
            .map_err(store_error)
    }

    async fn list(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        self.client.history(thread_id).await.map_err(store_error)
    }
}
