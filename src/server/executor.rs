//! Executor collaborator contract and per-call context

use crate::adapters::ExecutionFailure;
use crate::error::Violation;
use crate::mcp::McpNotification;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Outcome of one module execution
pub type ExecutionResult = std::result::Result<Value, ExecutionFailure>;

/// Stream of partial results; chunks are shallow-merged objects
pub type ChunkStream = BoxStream<'static, ExecutionResult>;

/// Runs modules on behalf of the router
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a module to completion
    async fn execute(&self, module_id: &str, arguments: &Value, context: &CallContext) -> ExecutionResult;

    /// Executor-side argument validation; `None` defers to the tool's input schema
    fn validate(&self, _module_id: &str, _arguments: &Value) -> Option<Vec<Violation>> {
        None
    }

    /// Chunked execution, when the module supports it
    fn stream(&self, _module_id: &str, _arguments: &Value, _context: &CallContext) -> Option<ChunkStream> {
        None
    }
}

/// Caller identity forwarded to the executor for its own ACL decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Identity {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Receives notifications produced while a call runs
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, notification: McpNotification);
}

/// Progress token of the current request paired with its delivery channel
#[derive(Clone)]
pub struct ProgressReporter {
    pub token: Value,
    pub sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(token: Value, sink: Arc<dyn ProgressSink>) -> Self {
        Self { token, sink }
    }

    pub async fn report(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        self.sink
            .send(McpNotification::progress(self.token.clone(), progress, total, message))
            .await;
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").field("token", &self.token).finish()
    }
}

/// User response to an elicitation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    /// User accepted and provided the requested data
    Accept,
    /// User declined to provide the data
    Decline,
    /// User dismissed the request
    Cancel,
}

/// Answer to [`CallContext::elicit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitResult {
    pub action: ElicitationAction,
    /// Submitted data; set only on accept
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<Value>,
}

impl ElicitResult {
    pub fn accept(content: Value) -> Self {
        Self {
            action: ElicitationAction::Accept,
            content: Some(content),
        }
    }

    pub fn decline() -> Self {
        Self {
            action: ElicitationAction::Decline,
            content: None,
        }
    }

    pub fn cancel() -> Self {
        Self {
            action: ElicitationAction::Cancel,
            content: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.action == ElicitationAction::Accept
    }
}

/// Asks the connected client for input while a call runs
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    /// Forward the prompt to the client; `None` when the client could not be asked
    async fn elicit(&self, message: &str, requested_schema: Value) -> Option<ElicitResult>;
}

/// Elicitation channel of the current request
#[derive(Clone)]
pub struct Elicitor {
    pub handler: Arc<dyn ElicitationHandler>,
}

impl Elicitor {
    pub fn new(handler: Arc<dyn ElicitationHandler>) -> Self {
        Self { handler }
    }

    /// A missing schema is sent as an empty object
    pub async fn elicit(&self, message: &str, requested_schema: Option<Value>) -> Option<ElicitResult> {
        let schema = requested_schema.unwrap_or_else(|| Value::Object(Map::new()));
        self.handler.elicit(message, schema).await
    }
}

impl std::fmt::Debug for Elicitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elicitor").finish_non_exhaustive()
    }
}

/// Context handed to the executor for one call
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Correlation id, also returned to the caller
    pub trace_id: String,
    pub identity: Option<Identity>,
    progress: Option<ProgressReporter>,
    elicitor: Option<Elicitor>,
}

impl CallContext {
    pub fn new<S: Into<String>>(trace_id: S, identity: Option<Identity>, progress: Option<ProgressReporter>) -> Self {
        Self {
            trace_id: trace_id.into(),
            identity,
            progress,
            elicitor: None,
        }
    }

    /// Attach the client's elicitation channel
    pub fn with_elicitor(mut self, elicitor: Option<Elicitor>) -> Self {
        self.elicitor = elicitor;
        self
    }

    /// Whether the client can be asked for input during this call
    pub fn can_elicit(&self) -> bool {
        self.elicitor.is_some()
    }

    /// Ask the client for input.
    ///
    /// Returns `None` when no elicitation channel is attached or the client
    /// could not be reached.
    pub async fn elicit(&self, message: &str, requested_schema: Option<Value>) -> Option<ElicitResult> {
        let Some(elicitor) = &self.elicitor else {
            debug!(trace_id = %self.trace_id, "Elicitation unavailable for this call");
            return None;
        };
        let result = elicitor.elicit(message, requested_schema).await;
        if result.is_none() {
            debug!(trace_id = %self.trace_id, "Elicitation request failed");
        }
        result
    }

    /// Whether the caller asked for progress notifications
    pub fn has_progress(&self) -> bool {
        self.progress.is_some()
    }

    pub fn progress(&self) -> Option<&ProgressReporter> {
        self.progress.as_ref()
    }

    /// Emit a progress notification; no-op when the caller did not ask for one
    pub async fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        if let Some(reporter) = &self.progress {
            reporter.report(progress, total, message).await;
        }
    }
}
