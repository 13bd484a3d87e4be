//! Configuration module for Toolbridge
//!
//! This module provides configuration management and loading utilities.

mod config;

// Re-export the main configuration types
pub use config::{
    BridgeConfig, ExecutionConfig, ExportConfig, LoggingConfig, RegistryConfig, ServerConfig, ToolsConfig,
    ENV_PREFIX,
};
