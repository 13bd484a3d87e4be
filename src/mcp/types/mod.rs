//! MCP types and structures
//!
//! Wire types for the tool-calling surface: tool descriptors, call results,
//! documentation resources and JSON-RPC envelopes.

use crate::error::{BridgeError, Result, Violation};
use crate::mcp::errors::McpError;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// JSON-RPC protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP Tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (unique identifier)
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Optional human-readable title
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// Optional JSON Schema for the result
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none", default)]
    pub output_schema: Option<Value>,
    /// Optional MCP annotations
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub annotations: Option<ToolAnnotations>,
    /// Extension metadata (`requiresApproval`, `streaming`)
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none", default)]
    pub meta: Option<Map<String, Value>>,
}

impl Tool {
    /// Create a new Tool with validation
    pub fn new(name: String, description: String, input_schema: Value) -> Result<Self> {
        let tool = Tool {
            name,
            description: Some(description),
            title: None,
            input_schema,
            output_schema: None,
            annotations: None,
            meta: None,
        };

        tool.validate()?;
        Ok(tool)
    }

    /// Validate the tool definition
    pub fn validate(&self) -> Result<()> {
        self.compile_validator().map(|_| ())
    }

    /// Validate the definition and compile its input schema for repeated use
    pub fn compile_validator(&self) -> Result<ArgumentValidator> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::schema("Tool name cannot be empty"));
        }

        if !self.input_schema.is_object() {
            return Err(BridgeError::schema(format!(
                "Input schema for tool '{}' must be an object",
                self.name
            )));
        }

        ArgumentValidator::compile(&self.input_schema)
            .map_err(|e| BridgeError::schema(format!("Invalid JSON Schema for tool '{}': {}", self.name, e)))
    }

    /// Validate arguments against the input schema, listing every violation
    pub fn validate_arguments(&self, arguments: &Value) -> Result<Vec<Violation>> {
        let validator = ArgumentValidator::compile(&self.input_schema).map_err(|e| {
            BridgeError::schema(format!("Failed to compile schema for tool '{}': {}", self.name, e))
        })?;
        Ok(validator.validate(arguments))
    }

    /// Whether `_meta` marks the tool as streaming
    pub fn is_streaming(&self) -> bool {
        self.meta_flag("streaming")
    }

    /// Whether `_meta` marks the tool as requiring approval
    pub fn requires_approval(&self) -> bool {
        self.meta_flag("requiresApproval")
    }

    fn meta_flag(&self, key: &str) -> bool {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Compiled input schema of a tool.
///
/// Cheap to clone. Always compares equal: it is derived from the schema it was
/// compiled from, so equality of the owning tool already covers it.
#[derive(Clone)]
pub struct ArgumentValidator {
    schema: Arc<JSONSchema>,
}

impl ArgumentValidator {
    /// Compile a JSON Schema; the error is the compiler's message
    pub fn compile(schema: &Value) -> std::result::Result<Self, String> {
        let compiled = JSONSchema::compile(schema).map_err(|e| e.to_string())?;
        Ok(Self {
            schema: Arc::new(compiled),
        })
    }

    /// Every violation of the schema, empty when `arguments` conform
    pub fn validate(&self, arguments: &Value) -> Vec<Violation> {
        match self.schema.validate(arguments) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| Violation::new(e.instance_path.to_string(), e.to_string()))
                .collect(),
        }
    }
}

impl PartialEq for ArgumentValidator {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl std::fmt::Debug for ArgumentValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentValidator").finish_non_exhaustive()
    }
}

/// MCP Tool annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    /// Indicates if tool is read-only
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none", default)]
    pub read_only_hint: Option<bool>,
    /// Indicates if tool is destructive
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none", default)]
    pub destructive_hint: Option<bool>,
    /// Indicates if tool is idempotent
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none", default)]
    pub idempotent_hint: Option<bool>,
    /// Indicates if tool has open-world semantics
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none", default)]
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    /// Create new annotations with no hints set
    pub fn new() -> Self {
        Self {
            title: None,
            read_only_hint: None,
            destructive_hint: None,
            idempotent_hint: None,
            open_world_hint: None,
        }
    }

    /// Set read-only hint
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only_hint = Some(read_only);
        self
    }

    /// Set destructive hint
    pub fn destructive(mut self, destructive: bool) -> Self {
        self.destructive_hint = Some(destructive);
        self
    }

    /// Set idempotent hint
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent_hint = Some(idempotent);
        self
    }

    /// Set open-world hint
    pub fn open_world(mut self, open_world: bool) -> Self {
        self.open_world_hint = Some(open_world);
        self
    }
}

impl Default for ToolAnnotations {
    fn default() -> Self {
        Self::new()
    }
}

/// Content blocks carried by a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// Text content
        text: String,
    },
    /// Image content (base64 encoded)
    #[serde(rename = "image")]
    Image {
        /// Base64 encoded image data
        data: String,
        /// MIME type (e.g., "image/png")
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ToolContent {
    /// Create text content
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text of a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Result of a `tools/call` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content validated and displayed by the client
    pub content: Vec<ToolContent>,
    /// MCP-compliant error flag
    #[serde(rename = "isError")]
    pub is_error: bool,
    /// Out-of-band metadata (`traceId`)
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none", default)]
    pub meta: Option<Map<String, Value>>,
}

impl CallToolResult {
    /// Correlation id carried in `_meta`
    pub fn trace_id(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("traceId"))
            .and_then(Value::as_str)
    }
}

/// MCP Resource definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource URI (unique identifier)
    pub uri: String,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// MIME type of the resource content
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
}

impl Resource {
    /// Create a resource with MIME type
    pub fn with_mime_type(uri: String, name: String, mime_type: String) -> Self {
        Self {
            uri,
            name,
            description: None,
            mime_type: Some(mime_type),
        }
    }
}

/// Resource content returned by resource read operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContent {
    /// Resource URI
    pub uri: String,
    /// MIME type of the content
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
    /// Text content
    pub text: String,
}

impl ResourceContent {
    /// Create text resource content
    pub fn text(uri: String, content: String, mime_type: Option<String>) -> Self {
        Self {
            uri,
            mime_type,
            text: content,
        }
    }
}

/// MCP Request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID (string, number, or absent for notifications)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new<M: Into<String>>(id: Value, method: M, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Requests without an id expect no response
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP Response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID this responds to
    pub id: Value,
    /// Result (if successful)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Server-to-client notification (no id, no response)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<Value>,
}

impl McpNotification {
    /// Build a `notifications/progress` message
    pub fn progress(progress_token: Value, progress: f64, total: Option<f64>, message: Option<String>) -> Self {
        let mut params = Map::new();
        params.insert("progressToken".to_string(), progress_token);
        params.insert("progress".to_string(), serde_json::json!(progress));
        if let Some(total) = total {
            params.insert("total".to_string(), serde_json::json!(total));
        }
        if let Some(message) = message {
            params.insert("message".to_string(), Value::String(message));
        }
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/progress".to_string(),
            params: Some(Value::Object(params)),
        }
    }
}
