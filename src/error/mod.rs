//! Error handling module for Toolbridge
//!
//! This module provides the crate error type and the validation violation record.

mod error;

// Re-export the main error types and utilities
pub use error::{BridgeError, Result, Violation};
