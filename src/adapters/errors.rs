//! Failure sanitization for call results.
//!
//! Sanitizing is two steps. [`ErrorMapper::classify`] turns whatever the
//! executor raised into a [`FailureClass`], which still holds the internal
//! detail for server-side logs. [`ErrorMapper::render`] then produces the
//! [`RenderedError`] returned to callers. Nothing in a `RenderedError` comes
//! from the failure except validation paths and messages, which describe the
//! caller's own input.

use crate::error::Violation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Upstream code for permission failures
pub const ACL_DENIED: &str = "ACL_DENIED";
/// Upstream code for argument validation failures
pub const SCHEMA_VALIDATION_ERROR: &str = "SCHEMA_VALIDATION_ERROR";
/// Upstream code for unknown modules
pub const MODULE_NOT_FOUND: &str = "MODULE_NOT_FOUND";
/// Upstream code for module timeouts
pub const MODULE_TIMEOUT: &str = "MODULE_TIMEOUT";
/// Upstream codes describing call-graph safety limits
pub const CALL_DEPTH_EXCEEDED: &str = "CALL_DEPTH_EXCEEDED";
pub const CIRCULAR_CALL: &str = "CIRCULAR_CALL";
pub const CALL_FREQUENCY_EXCEEDED: &str = "CALL_FREQUENCY_EXCEEDED";

const INTERNAL_MODULE_CODES: &[&str] = &[CALL_DEPTH_EXCEEDED, CIRCULAR_CALL, CALL_FREQUENCY_EXCEEDED];

/// Failure raised by an executor
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    /// Typed module error with an upstream code
    #[error("{code}: {message}")]
    Module {
        code: String,
        message: String,
        details: Option<Value>,
    },
    /// Anything else
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ExecutionFailure {
    pub fn module<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self::Module {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn module_with_details<C: Into<String>, M: Into<String>>(code: C, message: M, details: Value) -> Self {
        Self::Module {
            code: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Stable error code exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidInput,
    ExecutionError,
    AccessDenied,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure, still carrying internal detail
#[derive(Debug, Clone, PartialEq)]
pub enum FailureClass {
    NotFound { detail: String },
    InvalidInput { violations: Vec<Violation> },
    Execution { upstream_code: String, detail: String },
    Authorization { detail: String },
    Internal { upstream_code: Option<String>, detail: String },
}

impl FailureClass {
    /// Internal description for server-side logging only
    pub fn log_detail(&self) -> String {
        match self {
            FailureClass::NotFound { detail } => detail.clone(),
            FailureClass::InvalidInput { violations } => join_violations(violations),
            FailureClass::Execution { upstream_code, detail } => format!("{}: {}", upstream_code, detail),
            FailureClass::Authorization { detail } => detail.clone(),
            FailureClass::Internal {
                upstream_code: Some(code),
                detail,
            } => format!("{}: {}", code, detail),
            FailureClass::Internal { detail, .. } => detail.clone(),
        }
    }
}

/// Caller-facing error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedError {
    pub code: ErrorCode,
    pub message: String,
}

/// Classifies and renders execution failures
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorMapper;

impl ErrorMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, failure: &ExecutionFailure) -> FailureClass {
        match failure {
            ExecutionFailure::Unexpected(error) => FailureClass::Internal {
                upstream_code: None,
                detail: format!("{:#}", error),
            },
            ExecutionFailure::Module { code, message, details } => match code.as_str() {
                ACL_DENIED => FailureClass::Authorization {
                    detail: message.clone(),
                },
                SCHEMA_VALIDATION_ERROR => FailureClass::InvalidInput {
                    violations: violations_from_details(details.as_ref()),
                },
                MODULE_NOT_FOUND => FailureClass::NotFound {
                    detail: message.clone(),
                },
                c if INTERNAL_MODULE_CODES.contains(&c) => FailureClass::Internal {
                    upstream_code: Some(code.clone()),
                    detail: message.clone(),
                },
                _ => FailureClass::Execution {
                    upstream_code: code.clone(),
                    detail: message.clone(),
                },
            },
        }
    }

    pub fn render(&self, class: &FailureClass) -> RenderedError {
        let (code, message) = match class {
            FailureClass::NotFound { .. } => (ErrorCode::NotFound, "Tool not found".to_string()),
            FailureClass::InvalidInput { violations } if violations.is_empty() => {
                (ErrorCode::InvalidInput, "Schema validation failed".to_string())
            }
            FailureClass::InvalidInput { violations } => (
                ErrorCode::InvalidInput,
                format!("Schema validation failed: {}", join_violations(violations)),
            ),
            FailureClass::Execution { .. } => {
                (ErrorCode::ExecutionError, "Module execution failed".to_string())
            }
            FailureClass::Authorization { .. } => (ErrorCode::AccessDenied, "Access denied".to_string()),
            FailureClass::Internal { .. } => {
                (ErrorCode::InternalError, "Internal error occurred".to_string())
            }
        };
        RenderedError { code, message }
    }

    /// Classify then render
    pub fn sanitize(&self, failure: &ExecutionFailure) -> RenderedError {
        self.render(&self.classify(failure))
    }
}

/// Read `details.errors[] = {field, message}` into violations
fn violations_from_details(details: Option<&Value>) -> Vec<Violation> {
    details
        .and_then(|d| d.get("errors"))
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    let field = e.get("field").and_then(Value::as_str).unwrap_or("unknown");
                    let message = e.get("message").and_then(Value::as_str).unwrap_or("invalid");
                    Violation::new(field, message)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
