//! Configuration structures and loading for Toolbridge

use crate::error::{BridgeError, Result};
use crate::openai::{CyclicSchemaPolicy, ExportOptions};
use crate::registry::ModuleFilter;
use crate::server::ToolNaming;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "TOOLBRIDGE_";

fn default_server_name() -> String {
    "toolbridge".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server identity reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

/// Module sources for the in-process registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// YAML module files loaded on discovery
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Which modules are exposed on the tool-calling surface, and under what names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub naming: ToolNaming,
    /// Modules must carry every listed tag
    #[serde(default)]
    pub tags: Vec<String>,
    /// Module ids must start with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ToolsConfig {
    pub fn filter(&self) -> ModuleFilter {
        ModuleFilter {
            tags: self.tags.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

/// Call handling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Validate arguments before invoking the executor
    #[serde(default)]
    pub validate_inputs: bool,
}

/// Defaults for function-calling exports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub embed_annotations: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub cyclic_policy: CyclicSchemaPolicy,
}

impl ExportConfig {
    /// Export options combining these defaults with a module filter
    pub fn options(&self, filter: ModuleFilter) -> ExportOptions {
        ExportOptions {
            embed_annotations: self.embed_annotations,
            strict: self.strict,
            filter,
            cyclic_policy: self.cyclic_policy,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(BridgeError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(BridgeError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.format,
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BridgeConfig {
    /// Load .env files in order of precedence
    fn load_env_files() {
        let env = std::env::var("TOOLBRIDGE_ENV")
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "development".to_string());

        // Each file overrides the previous one
        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => tracing::info!("Loaded environment variables from {}", env_file),
                Err(e) if e.not_found() => tracing::debug!("No {} file found, skipping", env_file),
                Err(e) => tracing::warn!("Failed to load {}: {}", env_file, e),
            }
        }

        tracing::debug!("Environment: {}", env);
    }

    /// Load configuration: `.env` files, then the YAML file (defaults when it
    /// does not exist), then `TOOLBRIDGE_*` overrides, then validation
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_env_files();

        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| BridgeError::config(format!("Failed to read config file: {}", e)))?;
            Self::from_yaml(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_environment_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without env processing or validation
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BridgeError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

        if let Some(name) = var("SERVER_NAME") {
            self.server.name = name;
        }
        if let Some(version) = var("SERVER_VERSION") {
            self.server.version = version;
        }

        if let Some(sources) = var("REGISTRY_SOURCES") {
            self.registry.sources = split_list(&sources);
        }

        if let Some(naming) = var("TOOL_NAMING") {
            self.tools.naming = match naming.to_lowercase().as_str() {
                "module_id" => ToolNaming::ModuleId,
                "normalized" => ToolNaming::Normalized,
                _ => {
                    return Err(BridgeError::config(format!(
                        "Invalid {}TOOL_NAMING value: {}. Must be one of: module_id, normalized",
                        ENV_PREFIX, naming
                    )))
                }
            };
        }
        if let Some(tags) = var("TOOL_TAGS") {
            self.tools.tags = split_list(&tags);
        }
        if let Some(prefix) = var("TOOL_PREFIX") {
            self.tools.prefix = Some(prefix);
        }

        if let Some(value) = var("VALIDATE_INPUTS") {
            self.execution.validate_inputs = parse_bool("VALIDATE_INPUTS", &value)?;
        }

        if let Some(value) = var("EXPORT_STRICT") {
            self.export.strict = parse_bool("EXPORT_STRICT", &value)?;
        }
        if let Some(value) = var("EXPORT_EMBED_ANNOTATIONS") {
            self.export.embed_annotations = parse_bool("EXPORT_EMBED_ANNOTATIONS", &value)?;
        }
        if let Some(policy) = var("CYCLIC_POLICY") {
            self.export.cyclic_policy = match policy.to_lowercase().as_str() {
                "omit" => CyclicSchemaPolicy::Omit,
                "best_effort" => CyclicSchemaPolicy::BestEffort,
                _ => {
                    return Err(BridgeError::config(format!(
                        "Invalid {}CYCLIC_POLICY value: {}. Must be one of: omit, best_effort",
                        ENV_PREFIX, policy
                    )))
                }
            };
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.name.trim().is_empty() {
            return Err(BridgeError::config("Server name cannot be empty"));
        }
        if self.server.version.trim().is_empty() {
            return Err(BridgeError::config("Server version cannot be empty"));
        }

        if let Some(prefix) = &self.tools.prefix {
            if prefix.trim().is_empty() {
                return Err(BridgeError::config("Tool prefix cannot be empty when set"));
            }
        }
        if self.tools.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(BridgeError::config("Tool tags cannot be empty"));
        }

        if self.registry.sources.iter().any(|source| source.trim().is_empty()) {
            return Err(BridgeError::config("Registry source paths cannot be empty"));
        }

        self.logging.validate()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BridgeError::config(format!(
            "Invalid {}{} environment variable: {}",
            ENV_PREFIX, name, value
        ))),
    }
}
