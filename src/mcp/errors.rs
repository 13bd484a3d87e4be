//! JSON-RPC 2.0 error objects for the tool-calling surface
//!
//! Tool failures never become JSON-RPC errors: they are reported inside a
//! `CallToolResult` with `isError: true`. The codes here cover protocol-level
//! problems (malformed request, unknown method, bad params, unknown resource).

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes used by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    // Standard JSON-RPC error codes
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Server-defined range
    ResourceNotFound = -32002,
}

impl McpErrorCode {
    /// Get the error code as i32
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Get a default message for this error code
    pub fn default_message(&self) -> &'static str {
        match self {
            McpErrorCode::ParseError => "Parse error",
            McpErrorCode::InvalidRequest => "Invalid request",
            McpErrorCode::MethodNotFound => "Method not found",
            McpErrorCode::InvalidParams => "Invalid params",
            McpErrorCode::InternalError => "Internal error",
            McpErrorCode::ResourceNotFound => "Resource not found",
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: McpErrorCode, message: String) -> Self {
        Self {
            code: code.code(),
            message,
            data: None,
        }
    }

    pub fn with_data(code: McpErrorCode, message: String, data: Value) -> Self {
        Self {
            code: code.code(),
            message,
            data: Some(data),
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: String) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: String) -> Self {
        Self::with_data(
            McpErrorCode::MethodNotFound,
            format!("Method '{}' not found", method),
            serde_json::json!({ "method": method }),
        )
    }

    pub fn invalid_params(message: String) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    pub fn internal_error() -> Self {
        Self::new(
            McpErrorCode::InternalError,
            McpErrorCode::InternalError.default_message().to_string(),
        )
    }

    pub fn resource_not_found(uri: String) -> Self {
        Self::with_data(
            McpErrorCode::ResourceNotFound,
            format!("Resource not found: {}", uri),
            serde_json::json!({ "uri": uri }),
        )
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Protocol-level rendering of crate errors.
///
/// Anything that could carry implementation detail collapses to a bare
/// internal error.
impl From<BridgeError> for McpError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::NotFound { name } => McpError::resource_not_found(name),
            BridgeError::InvalidId { .. } | BridgeError::InvalidInput { .. } => {
                McpError::invalid_params(error.to_string())
            }
            BridgeError::Serde(e) => McpError::invalid_params(format!("Invalid params: {}", e)),
            _ => McpError::internal_error(),
        }
    }
}
