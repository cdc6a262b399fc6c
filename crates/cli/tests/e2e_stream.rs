//! End-to-end tests: a real gateway on a local port, the HTTP chat client,
//! the SSE parser and the stream consumer, with a scripted model and stub
//! tools standing in for the external services.

use std::sync::Arc;

use ripple::{ChatClient, ClientError, HttpConversationStore};
use ripple_agent::AgentGraph;
use ripple_agent::testing::{FailingTool, StaticTool};
use ripple_core::conversation::ConversationStore;
use ripple_core::message::{Message, Role, ThreadId};
use ripple_core::stream::StreamEvent;
use ripple_core::tool::ToolRegistry;
use ripple_gateway::{BearerTokenAuth, GatewayState};
use ripple_protocol::{ConsumerStatus, ConsumerUpdate, StreamConsumer};
use ripple_providers::{ScriptedProvider, ScriptedTurn};
use ripple_store::{InMemoryCheckpointStore, InMemoryConversationStore};

struct Gateway {
    url: String,
    conversations: Arc<InMemoryConversationStore>,
}

async fn spawn_gateway(turns: Vec<ScriptedTurn>, tokens: Vec<String>) -> Gateway {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(StaticTool::new("get_weather", "22C")));
    tools.register(Arc::new(FailingTool::new("transcript")));

    let agent = AgentGraph::new(
        Arc::new(ScriptedProvider::new(turns)),
        Arc::new(tools),
        Arc::new(InMemoryCheckpointStore::new()),
        "scripted-model",
    )
    .with_system_prompt("You are a helpful assistant.");

    let conversations = Arc::new(InMemoryConversationStore::new());
    let state = GatewayState::new(Arc::new(agent), conversations.clone())
        .with_auth(Arc::new(BearerTokenAuth::new(tokens)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        ripple_gateway::serve(listener, Arc::new(state)).await.unwrap();
    });

    Gateway {
        url: format!("http://{addr}"),
        conversations,
    }
}

fn weather_script() -> Vec<ScriptedTurn> {
    vec![
        ScriptedTurn::tool_call("call_1", "get_weather", serde_json::json!({"location": "Paris"})),
        ScriptedTurn::text("It is 22C in Paris."),
    ]
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn e2e_weather_frame_sequence() {
    let gateway = spawn_gateway(weather_script(), vec![]).await;
    let client = ChatClient::new(&gateway.url);

    let events = drain(
        client
            .open_stream(
                &ThreadId::from("chat-1"),
                &[Message::user("hi")],
                "weather in Paris?",
            )
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events[0], StreamEvent::Connected);
    assert!(matches!(&events[1], StreamEvent::ToolStart { tool, input }
        if tool == "get_weather" && input["location"] == "Paris"));
    assert_eq!(
        events[2],
        StreamEvent::ToolEnd {
            tool: "get_weather".into(),
            output: serde_json::json!("22C"),
        }
    );
    let tokens: String = events[3..events.len() - 1]
        .iter()
        .map(|e| match e {
            StreamEvent::Token { token } => token.as_str(),
            other => panic!("expected token, got {other:?}"),
        })
        .collect();
    assert_eq!(tokens, "It is 22C in Paris.");
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn e2e_weather_turn_persists_answer() {
    let gateway = spawn_gateway(weather_script(), vec![]).await;
    let client = ChatClient::new(&gateway.url);
    let thread = ThreadId::from("chat-1");

    let store = Arc::new(HttpConversationStore::new(client.clone()));
    let mut consumer = StreamConsumer::new(store, thread.clone(), vec![Message::user("hi")]);

    let mut updates = Vec::new();
    let status = client
        .send_turn(&mut consumer, &thread, "weather in Paris?", |u| updates.push(u.clone()))
        .await
        .unwrap();
    assert_eq!(status, ConsumerStatus::Completed);

    let tool_updates: Vec<&ConsumerUpdate> = updates
        .iter()
        .filter(|u| matches!(u, ConsumerUpdate::ToolStarted(_) | ConsumerUpdate::ToolFinished(_)))
        .collect();
    assert_eq!(tool_updates.len(), 2);

    // the user turn (saved by the gateway) and the answer (saved by the client)
    let stored = gateway.conversations.list(&thread).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, Role::User);
    assert_eq!(stored[0].content, "weather in Paris?");
    assert_eq!(stored[1].role, Role::Assistant);
    assert_eq!(stored[1].content, "It is 22C in Paris.");

    let local = consumer.messages();
    assert_eq!(local.last().unwrap().content, "It is 22C in Paris.");
}

#[tokio::test]
async fn e2e_model_failure_rolls_back() {
    let gateway = spawn_gateway(vec![ScriptedTurn::Fail("model unavailable".into())], vec![]).await;
    let client = ChatClient::new(&gateway.url);
    let thread = ThreadId::from("chat-2");

    let store = Arc::new(HttpConversationStore::new(client.clone()));
    let mut consumer = StreamConsumer::new(store, thread.clone(), vec![]);

    let status = client
        .send_turn(&mut consumer, &thread, "hello?", |_| {})
        .await
        .unwrap();

    assert_eq!(status, ConsumerStatus::Failed);
    assert!(consumer.error().unwrap().contains("model unavailable"));
    assert!(consumer.messages().is_empty());

    // only the user turn reached storage
    let stored = gateway.conversations.list(&thread).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, Role::User);
}

#[tokio::test]
async fn e2e_tool_failure_still_answers() {
    let gateway = spawn_gateway(
        vec![
            ScriptedTurn::tool_call("call_1", "transcript", serde_json::json!({"video": "abc"})),
            ScriptedTurn::text("I could not fetch the transcript."),
        ],
        vec![],
    )
    .await;
    let client = ChatClient::new(&gateway.url);

    let events = drain(
        client
            .open_stream(&ThreadId::from("chat-3"), &[], "summarize abc")
            .await
            .unwrap(),
    )
    .await;

    match &events[2] {
        StreamEvent::ToolEnd { tool, output } => {
            assert_eq!(tool, "transcript");
            assert!(output["error"].as_str().unwrap().contains("service unavailable"));
        }
        other => panic!("expected tool_end, got {other:?}"),
    }
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn e2e_unauthorized_is_rejected_before_streaming() {
    let gateway = spawn_gateway(weather_script(), vec!["secret".into()]).await;
    let thread = ThreadId::from("chat-4");

    let anonymous = ChatClient::new(&gateway.url);
    let err = anonymous
        .open_stream(&thread, &[], "weather in Paris?")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 401, .. }));
    assert!(gateway.conversations.list(&thread).await.unwrap().is_empty());

    let authorized = ChatClient::new(&gateway.url).with_token("secret");
    let events = drain(
        authorized
            .open_stream(&thread, &[], "weather in Paris?")
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn e2e_second_turn_resumes_thread() {
    let gateway = spawn_gateway(
        vec![
            ScriptedTurn::text("Hello!"),
            ScriptedTurn::text("You said hi."),
        ],
        vec![],
    )
    .await;
    let client = ChatClient::new(&gateway.url);
    let thread = ThreadId::from("chat-5");
    let store = Arc::new(HttpConversationStore::new(client.clone()));
    let mut consumer = StreamConsumer::new(store, thread.clone(), vec![]);

    client.send_turn(&mut consumer, &thread, "hi", |_| {}).await.unwrap();
    client
        .send_turn(&mut consumer, &thread, "what did I say?", |_| {})
        .await
        .unwrap();

    let history = client.history(&thread).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "Hello!", "what did I say?", "You said hi."]);
}
