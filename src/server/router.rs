//! Tool call routing
//!
//! Each call goes through resolve, optional validation, execution and
//! sanitization, and then stops. Every outcome carries a fresh trace id in
//! metadata, whatever happened. Failure detail is logged with that trace id
//! and never returned to the caller.

use crate::adapters::{ErrorCode, ErrorMapper, ExecutionFailure, FailureClass, ModuleIdNormalizer};
use crate::error::Violation;
use crate::mcp::{CallToolResult, ToolContent};
use crate::server::executor::{
    CallContext, ChunkStream, Elicitor, ExecutionResult, Executor, Identity, ProgressReporter,
};
use crate::server::listener::{RegistryListener, RegistrySnapshot, SnapshotEntry};
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A protocol-level tool call
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub tool_name: String,
    pub arguments: Value,
    pub identity: Option<Identity>,
    pub progress: Option<ProgressReporter>,
    pub elicitor: Option<Elicitor>,
}

impl CallRequest {
    pub fn new<S: Into<String>>(tool_name: S, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            identity: None,
            progress: None,
            elicitor: None,
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_elicitor(mut self, elicitor: Elicitor) -> Self {
        self.elicitor = Some(elicitor);
        self
    }
}

/// Terminal outcome of a call
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// Exactly what the protocol validates and displays
    pub content: Vec<ToolContent>,
    pub is_error: bool,
    pub trace_id: String,
    /// Stable code for failures
    pub error_code: Option<ErrorCode>,
}

impl CallResult {
    fn success(content: Vec<ToolContent>, trace_id: String) -> Self {
        Self {
            content,
            is_error: false,
            trace_id,
            error_code: None,
        }
    }

    /// Wire form; trace id and error code travel in `_meta`
    pub fn into_mcp(self) -> CallToolResult {
        let mut meta = Map::new();
        meta.insert("traceId".to_string(), Value::String(self.trace_id));
        if let Some(code) = self.error_code {
            meta.insert("errorCode".to_string(), Value::String(code.as_str().to_string()));
        }
        CallToolResult {
            content: self.content,
            is_error: self.is_error,
            meta: Some(meta),
        }
    }
}

/// Routes tool calls from the live snapshot to the executor
pub struct ExecutionRouter {
    listener: Arc<RegistryListener>,
    executor: Arc<dyn Executor>,
    validate_inputs: bool,
    normalizer: ModuleIdNormalizer,
    error_mapper: ErrorMapper,
}

impl ExecutionRouter {
    pub fn new(listener: Arc<RegistryListener>, executor: Arc<dyn Executor>) -> Self {
        Self {
            listener,
            executor,
            validate_inputs: false,
            normalizer: ModuleIdNormalizer::new(),
            error_mapper: ErrorMapper::new(),
        }
    }

    /// Enable pre-execution validation of arguments
    pub fn with_validation(mut self, validate_inputs: bool) -> Self {
        self.validate_inputs = validate_inputs;
        self
    }

    pub fn validates_inputs(&self) -> bool {
        self.validate_inputs
    }

    /// Handle a call with no progress or elicitation channel
    pub async fn call(&self, tool_name: &str, arguments: Value, identity: Option<Identity>) -> CallResult {
        let mut request = CallRequest::new(tool_name, arguments);
        request.identity = identity;
        self.handle(request).await
    }

    pub async fn handle(&self, request: CallRequest) -> CallResult {
        let trace_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let CallRequest {
            tool_name,
            arguments,
            identity,
            progress,
            elicitor,
        } = request;

        debug!(trace_id = %trace_id, tool_name = %tool_name, "Routing tool call");

        // Held as an Arc, not a lock: registrations may land while this call runs
        let snapshot = self.listener.snapshot();
        let Some(entry) = self.resolve(&snapshot, &tool_name) else {
            let class = FailureClass::NotFound {
                detail: format!("no exposed tool named '{}'", tool_name),
            };
            return self.fail(class, &trace_id, &tool_name, None);
        };
        let module_id = entry.module_id.as_str();

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        if !arguments.is_object() {
            let class = FailureClass::InvalidInput {
                violations: vec![Violation::new("", "arguments must be an object")],
            };
            return self.fail(class, &trace_id, &tool_name, Some(module_id));
        }

        if self.validate_inputs {
            if let Some(class) = self.check_arguments(entry, &arguments) {
                return self.fail(class, &trace_id, &tool_name, Some(module_id));
            }
        }

        let context = CallContext::new(trace_id.clone(), identity, progress).with_elicitor(elicitor);
        let stream = if context.has_progress() {
            self.executor.stream(module_id, &arguments, &context)
        } else {
            None
        };
        let outcome = match stream {
            Some(chunks) => self.consume_stream(chunks, &context).await,
            None => self.executor.execute(module_id, &arguments, &context).await,
        };

        match outcome {
            Ok(value) => {
                info!(
                    trace_id = %trace_id,
                    tool_name = %tool_name,
                    module_id = %module_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Tool call completed"
                );
                CallResult::success(vec![render_value(&value)], trace_id)
            }
            Err(failure) => {
                let class = self.error_mapper.classify(&failure);
                self.fail(class, &trace_id, &tool_name, Some(module_id))
            }
        }
    }

    /// Exact tool name first, then the raw module id, then the module id a
    /// normalized name decodes to
    fn resolve<'s>(&self, snapshot: &'s RegistrySnapshot, tool_name: &str) -> Option<&'s SnapshotEntry> {
        snapshot
            .get_by_name(tool_name)
            .or_else(|| snapshot.get(tool_name))
            .or_else(|| {
                self.normalizer
                    .denormalize(tool_name)
                    .ok()
                    .and_then(|module_id| snapshot.get(&module_id))
            })
    }

    fn check_arguments(&self, entry: &SnapshotEntry, arguments: &Value) -> Option<FailureClass> {
        let violations = self
            .executor
            .validate(&entry.module_id, arguments)
            .unwrap_or_else(|| entry.validator.validate(arguments));
        (!violations.is_empty()).then_some(FailureClass::InvalidInput { violations })
    }

    /// Forward each chunk as progress and shallow-merge them into one object
    async fn consume_stream(&self, mut chunks: ChunkStream, context: &CallContext) -> ExecutionResult {
        let mut accumulated = Map::new();
        let mut index: u64 = 0;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let Value::Object(fields) = chunk else {
                return Err(ExecutionFailure::Unexpected(anyhow::anyhow!(
                    "stream chunk {} is not an object",
                    index
                )));
            };

            index += 1;
            let message = Value::Object(fields.clone()).to_string();
            context.report_progress(index as f64, None, Some(message)).await;
            accumulated.extend(fields);
        }

        debug!(trace_id = %context.trace_id, chunks = index, "Stream finished");
        Ok(Value::Object(accumulated))
    }

    fn fail(&self, class: FailureClass, trace_id: &str, tool_name: &str, module_id: Option<&str>) -> CallResult {
        let rendered = self.error_mapper.render(&class);
        let module_id = module_id.unwrap_or("-");
        match &class {
            FailureClass::Execution { .. } | FailureClass::Internal { .. } => error!(
                trace_id = %trace_id,
                tool_name = %tool_name,
                module_id = %module_id,
                error_code = %rendered.code,
                detail = %class.log_detail(),
                "Tool call failed"
            ),
            _ => warn!(
                trace_id = %trace_id,
                tool_name = %tool_name,
                module_id = %module_id,
                error_code = %rendered.code,
                detail = %class.log_detail(),
                "Tool call rejected"
            ),
        }

        CallResult {
            content: vec![ToolContent::text(rendered.message)],
            is_error: true,
            trace_id: trace_id.to_string(),
            error_code: Some(rendered.code),
        }
    }
}

fn render_value(value: &Value) -> ToolContent {
    ToolContent::text(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModuleDescriptor;
    use crate::server::factory::ToolBuilder;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        async fn execute(&self, module_id: &str, arguments: &Value, context: &CallContext) -> ExecutionResult {
            if module_id == "fail.internal" {
                return Err(ExecutionFailure::Unexpected(anyhow::anyhow!("boom at /srv/app/secret.rs")));
            }
            Ok(json!({
                "module": module_id,
                "args": arguments,
                "caller": context.identity.as_ref().map(|i| i.id.clone()),
            }))
        }
    }

    fn router(validate: bool) -> ExecutionRouter {
        let listener = Arc::new(RegistryListener::new(ToolBuilder::default()));
        for id in ["image.resize", "fail.internal"] {
            listener
                .register(Arc::new(ModuleDescriptor::new(
                    id,
                    "test",
                    json!({"type": "object", "properties": {"w": {"type": "integer"}}, "required": ["w"]}),
                )))
                .unwrap();
        }
        ExecutionRouter::new(listener, Arc::new(Echo)).with_validation(validate)
    }

    #[tokio::test]
    async fn test_success_content_has_no_trace_id() {
        let result = router(false)
            .call("image.resize", json!({"w": 10}), Some(Identity::new("alice")))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);
        let body: Value = serde_json::from_str(result.content[0].as_text().unwrap()).unwrap();
        assert_eq!(body["module"], "image.resize");
        assert_eq!(body["caller"], "alice");
        assert!(!result.content[0].as_text().unwrap().contains(&result.trace_id));
        assert!(Uuid::parse_str(&result.trace_id).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let result = router(false).call("nope.missing", json!({}), None).await;
        assert!(result.is_error);
        assert_eq!(result.error_code, Some(ErrorCode::NotFound));
        assert_eq!(result.content[0].as_text(), Some("Tool not found"));
        assert!(!result.trace_id.is_empty());
    }

    #[tokio::test]
    async fn test_normalized_name_resolves() {
        let result = router(false).call("image-resize", json!({"w": 1}), None).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_execution() {
        let result = router(true).call("image.resize", json!({"w": "wide"}), None).await;
        assert!(result.is_error);
        assert_eq!(result.error_code, Some(ErrorCode::InvalidInput));
        assert!(result.content[0].as_text().unwrap().contains("/w"));
    }

    #[tokio::test]
    async fn test_non_object_arguments_rejected() {
        let result = router(false).call("image.resize", json!([1, 2]), None).await;
        assert_eq!(result.error_code, Some(ErrorCode::InvalidInput));
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_sanitized() {
        let result = router(false).call("fail.internal", json!({"w": 1}), None).await;
        assert!(result.is_error);
        assert_eq!(result.error_code, Some(ErrorCode::InternalError));
        let text = result.content[0].as_text().unwrap();
        assert_eq!(text, "Internal error occurred");
        assert!(!text.contains("secret"));

        let wire = serde_json::to_value(result.clone().into_mcp()).unwrap();
        assert_eq!(wire["isError"], true);
        assert_eq!(wire["_meta"]["traceId"], result.trace_id);
        assert_eq!(wire["_meta"]["errorCode"], "INTERNAL_ERROR");
        assert_eq!(wire["content"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_every_call_gets_a_distinct_trace_id() {
        let router = router(false);
        let first = router.call("image.resize", json!({"w": 1}), None).await;
        let second = router.call("nope", json!({}), None).await;
        assert_ne!(first.trace_id, second.trace_id);
    }
}
