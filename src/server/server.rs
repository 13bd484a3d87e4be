//! Bridge server façade
//!
//! Ties the registry listener, execution router and function-calling export
//! together and dispatches JSON-RPC requests from an externally supplied
//! transport.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::mcp::{
    CallToolResult, McpError, McpRequest, McpResponse, Resource, ResourceContent, Tool, JSONRPC_VERSION,
};
use crate::openai::{ExportOptions, OpenAiConverter, OpenAiTool};
use crate::registry::{InMemoryRegistry, ModuleRegistry};
use crate::server::executor::{ElicitationHandler, Elicitor, Executor, Identity, ProgressReporter, ProgressSink};
use crate::server::factory::ToolBuilder;
use crate::server::listener::RegistryListener;
use crate::server::router::{CallRequest, ExecutionRouter};
use crate::startup::StartupLogger;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Protocol revision announced during `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// URI scheme of module documentation resources
pub const DOCS_SCHEME: &str = "docs://";

const DOCS_MIME_TYPE: &str = "text/plain";

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
    #[serde(rename = "_meta", default)]
    meta: Option<Map<String, Value>>,
}

impl ToolCallParams {
    fn progress_token(&self) -> Option<Value> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("progressToken"))
            .filter(|token| !token.is_null())
            .cloned()
    }
}

/// Per-connection channels the transport supplies with each request
#[derive(Clone, Default)]
pub struct ClientSession {
    pub identity: Option<Identity>,
    /// Receives progress notifications for calls that carry a progress token
    pub progress_sink: Option<Arc<dyn ProgressSink>>,
    /// Forwards elicitation prompts to the client, when it supports them
    pub elicitation: Option<Arc<dyn ElicitationHandler>>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    pub fn with_elicitation(mut self, handler: Arc<dyn ElicitationHandler>) -> Self {
        self.elicitation = Some(handler);
        self
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("identity", &self.identity)
            .field("progress_sink", &self.progress_sink.is_some())
            .field("elicitation", &self.elicitation.is_some())
            .finish()
    }
}

/// Tool-calling server over a module registry
pub struct BridgeServer {
    config: BridgeConfig,
    registry: Arc<dyn ModuleRegistry>,
    listener: Arc<RegistryListener>,
    router: ExecutionRouter,
    converter: OpenAiConverter,
}

impl BridgeServer {
    pub fn new(config: BridgeConfig, registry: Arc<dyn ModuleRegistry>, executor: Arc<dyn Executor>) -> Self {
        let builder = ToolBuilder::new(config.tools.naming);
        let listener = Arc::new(RegistryListener::with_filter(builder, config.tools.filter()));
        let router = ExecutionRouter::new(Arc::clone(&listener), executor)
            .with_validation(config.execution.validate_inputs);

        Self {
            config,
            registry,
            listener,
            router,
            converter: OpenAiConverter::new(),
        }
    }

    /// Build a server over an [`InMemoryRegistry`] reading the configured module files
    pub fn from_config(config: BridgeConfig, executor: Arc<dyn Executor>) -> Self {
        let registry = config
            .registry
            .sources
            .iter()
            .fold(InMemoryRegistry::new(), |registry, source| registry.with_source(source));
        Self::new(config, Arc::new(registry), executor)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn listener(&self) -> &Arc<RegistryListener> {
        &self.listener
    }

    pub fn router(&self) -> &ExecutionRouter {
        &self.router
    }

    /// Discover modules and start following registry events.
    ///
    /// Returns the number of exposed tools.
    pub async fn start(&self) -> Result<usize> {
        let discovered = self.registry.discover().await?;
        debug!("Registry reported {} modules", discovered);

        let count = self.listener.start(Arc::clone(&self.registry));
        StartupLogger::display_startup_info(&self.config, count);
        Ok(count)
    }

    pub fn stop(&self) {
        self.listener.stop();
        info!("Bridge server stopped");
    }

    /// Tools of the current snapshot, ordered by module id
    pub fn list_tools(&self) -> Vec<Tool> {
        self.listener.tools()
    }

    /// Execute a tool call; failures come back as `isError` results.
    ///
    /// Progress is reported only when both a token and the session's sink are present.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        session: &ClientSession,
        progress_token: Option<Value>,
    ) -> CallToolResult {
        let mut request = CallRequest::new(name, arguments);
        request.identity = session.identity.clone();
        request.progress = match (progress_token, &session.progress_sink) {
            (Some(token), Some(sink)) => Some(ProgressReporter::new(token, Arc::clone(sink))),
            _ => None,
        };
        request.elicitor = session.elicitation.as_ref().map(|handler| Elicitor::new(Arc::clone(handler)));
        self.router.handle(request).await.into_mcp()
    }

    /// Documentation resources of the exposed modules
    pub fn list_resources(&self) -> Vec<Resource> {
        self.listener
            .snapshot()
            .entries()
            .filter(|entry| entry.descriptor.documentation.is_some())
            .map(|entry| {
                let mut resource = Resource::with_mime_type(
                    format!("{}{}", DOCS_SCHEME, entry.module_id),
                    format!("{} documentation", entry.module_id),
                    DOCS_MIME_TYPE.to_string(),
                );
                if !entry.descriptor.description.is_empty() {
                    resource.description = Some(entry.descriptor.description.clone());
                }
                resource
            })
            .collect()
    }

    pub fn read_resource(&self, uri: &str) -> Result<ResourceContent> {
        let module_id = uri
            .strip_prefix(DOCS_SCHEME)
            .ok_or_else(|| BridgeError::not_found(uri))?;

        let snapshot = self.listener.snapshot();
        let documentation = snapshot
            .get(module_id)
            .and_then(|entry| entry.descriptor.documentation.clone())
            .ok_or_else(|| BridgeError::not_found(uri))?;

        Ok(ResourceContent::text(
            uri.to_string(),
            documentation,
            Some(DOCS_MIME_TYPE.to_string()),
        ))
    }

    /// Export options from the configured defaults and tool filter
    pub fn export_options(&self) -> ExportOptions {
        self.config.export.options(self.config.tools.filter())
    }

    /// Function-calling definitions from the live snapshot
    pub fn openai_tools(&self, options: &ExportOptions) -> Vec<OpenAiTool> {
        self.converter
            .to_tool_definitions(&self.listener.snapshot(), options)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {}
            },
            "serverInfo": {
                "name": self.config.server.name,
                "version": self.config.server.version
            }
        })
    }

    /// Dispatch one JSON-RPC request. Notifications produce no response.
    pub async fn handle_request(&self, request: McpRequest, session: &ClientSession) -> Option<McpResponse> {
        debug!("Handling MCP method: {}", request.method);

        if request.method == "initialized" || request.method.starts_with("notifications/") {
            return None;
        }
        let Some(id) = request.id.clone() else {
            warn!(method = %request.method, "Dropping request without an id");
            return None;
        };

        let params = request.params.unwrap_or_else(|| json!({}));
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": self.list_tools()})),
            "tools/call" => self.dispatch_call(params, session).await,
            "resources/list" => Ok(json!({"resources": self.list_resources()})),
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
                self.read_resource(uri)
                    .map(|content| json!({"contents": [content]}))
                    .map_err(McpError::from)
            }
            other => Err(McpError::method_not_found(other.to_string())),
        };

        Some(match outcome {
            Ok(result) => McpResponse::success(id, result),
            Err(error) => McpResponse::error(id, error),
        })
    }

    async fn dispatch_call(&self, params: Value, session: &ClientSession) -> std::result::Result<Value, McpError> {
        let call: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| McpError::invalid_params(format!("Invalid tool call parameters: {}", e)))?;

        let token = call.progress_token();
        let result = self.call_tool(&call.name, call.arguments, session, token).await;
        serde_json::to_value(result).map_err(|_| McpError::internal_error())
    }

    /// Handle one raw JSON-RPC message, returning the serialized response
    pub async fn handle_message(&self, message: &str, session: &ClientSession) -> Option<String> {
        let response = match serde_json::from_str::<McpRequest>(message) {
            Ok(request) if request.jsonrpc != JSONRPC_VERSION => Some(McpResponse::error(
                request.id.unwrap_or(Value::Null),
                McpError::invalid_request(format!("Unsupported jsonrpc version '{}'", request.jsonrpc)),
            )),
            Ok(request) => self.handle_request(request, session).await,
            Err(e) => Some(McpResponse::error(
                Value::Null,
                McpError::parse_error(format!("Invalid JSON-RPC message: {}", e)),
            )),
        }?;

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to serialize response: {}", e);
                None
            }
        }
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        if self.listener.is_active() {
            self.listener.stop();
        }
    }
}
