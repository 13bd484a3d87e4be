//! MCP (Model Context Protocol) wire types
//!
//! This module contains the tool-calling protocol structures and JSON-RPC
//! error codes used by the bridge server.

pub mod errors;
pub mod types;

pub use errors::{McpError, McpErrorCode};
pub use types::*;
