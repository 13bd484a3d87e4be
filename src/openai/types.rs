//! OpenAI function-calling types

use crate::registry::ModuleFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a chat-completions `tools` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiTool {
    /// Always `"function"`
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

impl OpenAiTool {
    pub fn function(function: OpenAiFunction) -> Self {
        Self {
            tool_type: "function".to_string(),
            function,
        }
    }
}

/// Function definition inside an [`OpenAiTool`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunction {
    /// Normalized name matching `^[a-zA-Z0-9_-]+$`
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
    /// Present (and true) only for strict exports
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strict: Option<bool>,
}

/// Handling of recursive schemas in strict exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclicSchemaPolicy {
    /// Leave the module out of the export
    #[default]
    Omit,
    /// Export the cycle-preserving schema without `strict: true`
    BestEffort,
}

/// Options for a function-calling export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Append the annotation summary to descriptions
    #[serde(default)]
    pub embed_annotations: bool,
    /// Emit strict, fully-closed schemas
    #[serde(default)]
    pub strict: bool,
    /// Tag and prefix selection
    #[serde(default)]
    pub filter: ModuleFilter,
    #[serde(default)]
    pub cyclic_policy: CyclicSchemaPolicy,
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn embed_annotations(mut self, embed: bool) -> Self {
        self.embed_annotations = embed;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_filter(mut self, filter: ModuleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn cyclic_policy(mut self, policy: CyclicSchemaPolicy) -> Self {
        self.cyclic_policy = policy;
        self
    }
}
