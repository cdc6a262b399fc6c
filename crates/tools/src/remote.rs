//! Remote tool — forwards a tool call to an HTTP tool service.
//!
//! The call input is POSTed as the JSON request body. A 2xx response body
//! is returned as the tool output (parsed as JSON when possible, otherwise
//! as a plain string). Anything else is a `ToolError`, which the agent
//! folds back into the conversation.

use async_trait::async_trait;
use ripple_core::error::ToolError;
use ripple_core::tool::Tool;
use std::time::Duration;
use tracing::debug;

pub struct RemoteTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_parameters(mut self, schema: serde_json::Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Sent as a bearer token on every call.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        if !input.is_object() {
            return Err(ToolError::InvalidArguments(format!(
                "'{}' expects a JSON object, got {input}",
                self.name
            )));
        }

        debug!(tool = %self.name, endpoint = %self.endpoint, "Calling remote tool");

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&input);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: self.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                self.failed(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failed(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(self.failed(format!("service returned {status}: {body}")));
        }

        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}
