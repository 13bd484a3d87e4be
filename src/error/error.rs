//! Error types and handling for Toolbridge

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Toolbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// A single violated constraint reported by input validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer (or field name) of the offending value
    pub path: String,
    /// Human-readable constraint description
    pub message: String,
}

impl Violation {
    pub fn new<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for Toolbridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Schema could not be resolved or canonicalized
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Module id does not match the module id pattern
    #[error("Invalid module id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// Tool or module is not currently exposed
    #[error("Not found: {name}")]
    NotFound { name: String },

    /// Pre-execution validation failed
    #[error("Invalid input: {}", join_violations(.violations))]
    InvalidInput { violations: Vec<Violation> },

    /// Module raised during execution
    #[error("Execution error: {module_id}: {message}")]
    Execution { module_id: String, message: String },

    /// Caller identity lacks permission
    #[error("Authorization error: {message}")]
    Authorization { message: String },

    /// Two modules resolved to the same protocol-facing name
    #[error("Tool name collision: '{name}' is already exposed by '{existing}'")]
    NameCollision { name: String, existing: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    /// Create a schema error
    pub fn schema<S: Into<String>>(message: S) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an invalid module id error
    pub fn invalid_id<I: Into<String>, R: Into<String>>(id: I, reason: R) -> Self {
        Self::InvalidId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create an invalid input error
    pub fn invalid_input(violations: Vec<Violation>) -> Self {
        Self::InvalidInput { violations }
    }

    /// Create an execution error
    pub fn execution<S: Into<String>>(module_id: S, message: S) -> Self {
        Self::Execution {
            module_id: module_id.into(),
            message: message.into(),
        }
    }

    /// Create an authorization error
    pub fn authorization<S: Into<String>>(message: S) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::Schema { .. } => "schema",
            BridgeError::InvalidId { .. } => "invalid_id",
            BridgeError::NotFound { .. } => "not_found",
            BridgeError::InvalidInput { .. } => "invalid_input",
            BridgeError::Execution { .. } => "execution",
            BridgeError::Authorization { .. } => "authorization",
            BridgeError::NameCollision { .. } => "name_collision",
            BridgeError::Config { .. } => "config",
            BridgeError::Io(_) => "io",
            BridgeError::Serde(_) => "serialization",
            BridgeError::Yaml(_) => "yaml",
            BridgeError::Internal(_) => "internal",
        }
    }
}
