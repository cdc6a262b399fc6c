//! The agent graph — a two-node reason/act state machine.
//!
//! ```text
//!            ┌──────── ToAgent ────────┐
//!            ▼                         │
//!  start ─▶ AGENT ── ToTools ──▶ TOOLS ┘
//!            │
//!            └── Terminate ──▶ DONE
//! ```
//!
//! AGENT invokes the model on the trimmed, cache-annotated history and
//! forwards every token the moment it arrives. If the reply requests tools,
//! TOOLS executes them one at a time, emitting a `ToolStart`/`ToolEnd` pair
//! around each, and hands control back to AGENT. A reply without tool calls
//! ends the run.
//!
//! Events go out through a bounded channel of capacity one, so the engine
//! never runs more than one event ahead of the transport. A model failure
//! is fatal and ends the run with a single `Error`; a tool failure is folded
//! into the history as an error-tagged tool result.

use chrono::Utc;
use ripple_core::checkpoint::{CheckpointStore, GraphState};
use ripple_core::error::ProviderError;
use ripple_core::event::{DomainEvent, EventBus};
use ripple_core::message::{Message, ThreadId, ToolCallRequest};
use ripple_core::provider::{ModelEvent, Provider, ProviderRequest};
use ripple_core::stream::StreamEvent;
use ripple_core::tool::ToolExecutor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::history::{TrimConfig, annotate, trim_with_report};

/// Graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Agent,
    Tools,
    Done,
}

/// Result of executing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ToTools,
    ToAgent,
    Terminate,
}

impl Transition {
    pub fn target(self) -> Node {
        match self {
            Self::ToTools => Node::Tools,
            Self::ToAgent => Node::Agent,
            Self::Terminate => Node::Done,
        }
    }
}

/// Input for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub thread_id: ThreadId,
    /// Prior conversation, used only when the thread has no checkpoint.
    pub history: Vec<Message>,
    /// The user turn that starts this run.
    pub new_message: Message,
}

/// Why a run stopped early.
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("{0}")]
    Model(#[from] ProviderError),

    #[error("Agent stopped after {0} model calls without a final answer")]
    TooManyIterations(u32),

    #[error("event receiver dropped")]
    Disconnected,
}

/// Per-run mutable context.
struct Run {
    thread_id: ThreadId,
    state: GraphState,
    tx: mpsc::Sender<StreamEvent>,
    tool_calls: usize,
}

impl Run {
    async fn emit(&self, event: StreamEvent) -> Result<(), RunError> {
        self.tx.send(event).await.map_err(|_| RunError::Disconnected)
    }

    /// Send the run's last event. Nothing is left to abort if the receiver
    /// is already gone, so that is only logged.
    async fn emit_terminal(&self, event: StreamEvent) -> bool {
        let tag = event.tag();
        match self.tx.send(event).await {
            Ok(()) => true,
            Err(_) => {
                debug!(tag, "Receiver gone before terminal event");
                false
            }
        }
    }
}

/// The reason/act engine. Cheap to share; one instance serves many runs.
pub struct AgentGraph {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolExecutor>,
    checkpoints: Arc<dyn CheckpointStore>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    trim: TrimConfig,
    max_iterations: u32,
}

impl AgentGraph {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            checkpoints,
            event_bus: Arc::new(EventBus::default()),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: None,
            trim: TrimConfig::default(),
            max_iterations: 25,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// System prompt prepended (with its own cache breakpoint) to every
    /// model call. Not counted against the history budget.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_trim(mut self, trim: TrimConfig) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Start a run in the background and return its event stream.
    ///
    /// The stream ends after exactly one terminal event (`Done` or `Error`),
    /// or early if the receiver is dropped.
    pub fn run_stream(self: &Arc<Self>, request: RunRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(1);
        let graph = Arc::clone(self);
        tokio::spawn(async move { graph.run(request, tx).await });
        rx
    }

    /// Drive a run to completion, sending events to `tx`.
    pub async fn run(&self, request: RunRequest, tx: mpsc::Sender<StreamEvent>) {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("run", %run_id, thread_id = %request.thread_id);
        self.run_inner(request, tx, run_id).instrument(span).await
    }

    async fn run_inner(&self, request: RunRequest, tx: mpsc::Sender<StreamEvent>, run_id: String) {
        let thread_id = request.thread_id.clone();
        let state = self.seed(request).await;

        info!(messages = state.messages.len(), "Run starting");
        self.event_bus.publish(DomainEvent::RunStarted {
            thread_id: thread_id.to_string(),
            run_id,
            timestamp: Utc::now(),
        });

        let mut run = Run {
            thread_id,
            state,
            tx,
            tool_calls: 0,
        };

        let mut node = Node::Agent;
        let outcome = loop {
            let step = match node {
                Node::Agent => self.agent_node(&mut run).await,
                Node::Tools => self.tools_node(&mut run).await,
                Node::Done => break Ok(()),
            };
            match step {
                Ok(transition) => {
                    self.checkpoint(&run).await;
                    node = transition.target();
                }
                Err(e) => break Err(e),
            }
        };

        self.finish(&run, outcome).await;
    }

    /// Initial state: the checkpointed thread if one exists, else the
    /// caller-supplied history, followed by the new user turn.
    async fn seed(&self, request: RunRequest) -> GraphState {
        let mut messages = match self.checkpoints.load(&request.thread_id).await {
            Ok(Some(saved)) => {
                debug!(messages = saved.messages.len(), "Resuming from checkpoint");
                saved.messages
            }
            Ok(None) => request.history,
            Err(e) => {
                warn!(error = %e, "Checkpoint load failed, starting from request history");
                request.history
            }
        };
        messages.push(request.new_message);
        GraphState::new(messages)
    }

    async fn checkpoint(&self, run: &Run) {
        let mut snapshot = run.state.clone();
        snapshot.updated_at = Utc::now();
        if let Err(e) = self.checkpoints.save(&run.thread_id, snapshot).await {
            warn!(error = %e, store = self.checkpoints.name(), "Checkpoint save failed");
        }
    }

    /// The prompt for one model call: trimmed, annotated, system prompt first.
    pub fn build_prompt(&self, messages: &[Message]) -> Vec<Message> {
        let (trimmed, report) = trim_with_report(messages, &self.trim);
        if report.dropped > 0 {
            debug!(dropped = report.dropped, partial = report.partial, "Prompt history trimmed");
        }
        let annotated = annotate(&trimmed);

        let mut prompt = Vec::with_capacity(annotated.len() + 1);
        if let Some(system) = &self.system_prompt {
            prompt.push(Message::system(system).cached());
        }
        prompt.extend(annotated);
        prompt
    }

    /// AGENT: one streamed model call.
    async fn agent_node(&self, run: &mut Run) -> Result<Transition, RunError> {
        run.state.steps += 1;
        if run.state.steps > self.max_iterations {
            return Err(RunError::TooManyIterations(self.max_iterations));
        }

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: self.build_prompt(&run.state.messages),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
        };

        debug!(step = run.state.steps, prompt = request.messages.len(), "Invoking model");
        let mut stream = self.provider.invoke(request).await?;

        run.state.response.clear();
        let mut calls: Vec<ToolCallRequest> = Vec::new();

        while let Some(item) = stream.recv().await {
            match item? {
                ModelEvent::Token(token) => {
                    run.state.response.push_str(&token);
                    run.emit(StreamEvent::Token { token }).await?;
                }
                ModelEvent::ToolCall(call) => {
                    debug!(tool = %call.name, id = %call.id, "Model requested tool");
                    calls.push(call);
                }
                ModelEvent::Usage(usage) => {
                    info!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        cache_read_tokens = usage.cache_read_tokens,
                        cache_creation_tokens = usage.cache_creation_tokens,
                        "Model usage"
                    );
                    self.event_bus.publish(DomainEvent::ResponseGenerated {
                        thread_id: run.thread_id.to_string(),
                        model: self.model.clone(),
                        tokens_used: usage.total_tokens,
                        cache_read_tokens: usage.cache_read_tokens,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        let mut reply = Message::assistant(std::mem::take(&mut run.state.response));
        let transition = if calls.is_empty() {
            Transition::Terminate
        } else {
            reply.tool_calls = calls;
            Transition::ToTools
        };
        run.state.messages.push(reply);
        Ok(transition)
    }

    /// TOOLS: execute every call of the latest assistant turn, in order.
    async fn tools_node(&self, run: &mut Run) -> Result<Transition, RunError> {
        let calls = run
            .state
            .messages
            .last()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        for call in calls {
            run.tool_calls += 1;
            run.emit(StreamEvent::ToolStart {
                tool: call.name.clone(),
                input: call.input.clone(),
            })
            .await?;

            let started = std::time::Instant::now();
            let result = self.tools.execute(&call.name, call.input.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: result.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });

            let output = match result {
                Ok(output) => {
                    debug!(tool = %call.name, duration_ms, "Tool finished");
                    run.state
                        .messages
                        .push(Message::tool_result(&call.id, output_text(&output)));
                    output
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool failed, returning error to model");
                    let text = e.to_string();
                    run.state
                        .messages
                        .push(Message::tool_error(&call.id, &text));
                    serde_json::json!({ "error": text })
                }
            };

            run.emit(StreamEvent::ToolEnd {
                tool: call.name,
                output,
            })
            .await?;
        }

        Ok(Transition::ToAgent)
    }

    async fn finish(&self, run: &Run, outcome: Result<(), RunError>) {
        let thread_id = run.thread_id.to_string();
        match outcome {
            Ok(()) => {
                info!(steps = run.state.steps, tool_calls = run.tool_calls, "Run completed");
                self.event_bus.publish(DomainEvent::RunCompleted {
                    thread_id,
                    steps: run.state.steps,
                    tool_calls: run.tool_calls,
                    timestamp: Utc::now(),
                });
                run.emit_terminal(StreamEvent::Done).await;
            }
            Err(RunError::Disconnected) => {
                info!("Client went away, run abandoned");
            }
            Err(e) => {
                warn!(error = %e, "Run failed");
                self.event_bus.publish(DomainEvent::RunFailed {
                    thread_id,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                run.emit_terminal(StreamEvent::error(e.to_string())).await;
            }
        }
    }
}

/// Text form of a tool output for the model: strings verbatim, other JSON
/// compact.
fn output_text(output: &serde_json::Value) -> String {
    match output {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
