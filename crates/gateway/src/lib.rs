//! HTTP gateway for Ripple.
//!
//! Exposes the streaming chat endpoint, thread message storage, an
//! operator event stream and a health check.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{
    Router,
    extract::State,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use ripple_agent::{AgentGraph, TrimConfig};
use ripple_config::AppConfig;
use ripple_core::conversation::{AuthCheck, ConversationStore, UserId};
use ripple_core::event::EventBus;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentGraph>,
    pub conversations: Arc<dyn ConversationStore>,
    pub auth: Arc<dyn AuthCheck>,
    pub event_bus: Arc<EventBus>,
    /// Idle interval after which the relay writes a keep-alive comment.
    pub keep_alive: Option<Duration>,
    pub body_limit: usize,
}

impl GatewayState {
    /// State with open access, no keep-alives and a 1 MB body limit.
    pub fn new(agent: Arc<AgentGraph>, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            event_bus: agent.event_bus().clone(),
            agent,
            conversations,
            auth: Arc::new(BearerTokenAuth::new(Vec::new())),
            keep_alive: None,
            body_limit: 1024 * 1024,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthCheck>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_keep_alive(mut self, idle: Duration) -> Self {
        self.keep_alive = Some(idle);
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }
}

pub type SharedState = Arc<GatewayState>;

/// Failures while assembling the gateway from configuration.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("No provider registered under '{0}'")]
    ProviderMissing(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ripple_config::ConfigError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Static bearer tokens. With no tokens configured every caller is let in
/// as `anonymous`.
pub struct BearerTokenAuth {
    tokens: Vec<String>,
}

impl BearerTokenAuth {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl AuthCheck for BearerTokenAuth {
    async fn authenticate(&self, bearer: Option<&str>) -> Option<UserId> {
        if self.tokens.is_empty() {
            return Some(UserId("anonymous".into()));
        }
        let token = bearer?;
        self.tokens
            .iter()
            .position(|t| t == token)
            .map(|i| UserId(format!("token-{i}")))
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer authentication on all /v1 routes
/// - CORS restricted to the local web client
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Assemble provider, tools, stores and engine from configuration.
pub fn build_state(config: &AppConfig) -> Result<GatewayState, GatewayError> {
    config.validate()?;

    let router = ripple_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or_else(|| GatewayError::ProviderMissing(config.default_provider.clone()))?;
    let model = ripple_providers::model_for(config, &config.default_provider);

    let tools = Arc::new(ripple_tools::registry_from_config(config));
    let stores = ripple_store::build_from_config(config);

    let mut agent = AgentGraph::new(provider, tools, stores.checkpoints, model)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_trim(TrimConfig::from(&config.history))
        .with_max_iterations(config.agent.max_iterations);
    if !config.agent.system_prompt.trim().is_empty() {
        agent = agent.with_system_prompt(&config.agent.system_prompt);
    }

    let mut state = GatewayState::new(Arc::new(agent), stores.conversations)
        .with_auth(Arc::new(BearerTokenAuth::new(
            config.gateway.bearer_tokens.clone(),
        )))
        .with_body_limit(config.gateway.body_limit_bytes);
    if config.gateway.keep_alive_secs > 0 {
        state = state.with_keep_alive(Duration::from_secs(config.gateway.keep_alive_secs));
    }
    Ok(state)
}

/// Serve on an already-bound listener until the process is stopped.
pub async fn serve(listener: tokio::net::TcpListener, state: SharedState) -> Result<(), GatewayError> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(build_state(&config)?);

    if config.gateway.bearer_tokens.is_empty() {
        warn!("No bearer tokens configured, /v1 is open to every caller");
    }

    info!(
        addr = %addr,
        provider = %config.default_provider,
        tools = config.tools.len(),
        store = %config.store.backend,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve(listener, state).await
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Resolves `Authorization: Bearer <token>` through the configured
/// [`AuthCheck`] and stores the caller in the request extensions. Rejection
/// happens here, before any handler (and so before any stream) runs.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    match state.auth.authenticate(bearer.as_deref()).await {
        Some(user) => {
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        None => {
            warn!(path = %req.uri().path(), "Unauthorized request, missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use ripple_agent::testing::StaticTool;
    use ripple_core::tool::ToolRegistry;
    use ripple_providers::{ScriptedProvider, ScriptedTurn};
    use ripple_store::{InMemoryCheckpointStore, InMemoryConversationStore};

    pub struct Harness {
        pub state: SharedState,
        pub conversations: Arc<InMemoryConversationStore>,
        pub provider: Arc<ScriptedProvider>,
    }

    pub fn harness(turns: Vec<ScriptedTurn>, tokens: Vec<String>) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(turns));
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StaticTool::new("get_weather", "22C")));

        let agent = AgentGraph::new(
            provider.clone(),
            Arc::new(tools),
            Arc::new(InMemoryCheckpointStore::new()),
            "test-model",
        );
        let conversations = Arc::new(InMemoryConversationStore::new());
        let state = GatewayState::new(Arc::new(agent), conversations.clone())
            .with_auth(Arc::new(BearerTokenAuth::new(tokens)));

        Harness {
            state: Arc::new(state),
            conversations,
            provider,
        }
    }
}
