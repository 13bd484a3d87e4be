//! Toolbridge - exposes a registry of executable modules as protocol tools
//!
//! Modules described by JSON Schema are published as tool-calling protocol
//! tools (with a live-updating tool list and an execution router) and can be
//! exported as OpenAI function-calling definitions, optionally in strict mode.

pub mod adapters;
pub mod config;
pub mod error;
pub mod mcp;
pub mod openai;
pub mod registry;
pub mod server;
pub mod startup;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use openai::{CyclicSchemaPolicy, ExportOptions, OpenAiConverter, OpenAiTool};
pub use registry::{InMemoryRegistry, ModuleDescriptor, ModuleRegistry};
pub use server::{BridgeServer, Executor, ExecutionRouter, RegistryListener};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "toolbridge.yaml";

/// Export function-calling definitions straight from a registry
pub fn to_openai_tools(registry: &dyn ModuleRegistry, options: &ExportOptions) -> Vec<OpenAiTool> {
    OpenAiConverter::new().convert_registry(registry, options)
}
