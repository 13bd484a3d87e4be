//! Registry types and structures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default value for the open_world annotation
fn default_open_world() -> bool {
    true
}

/// Behavioral annotations declared by a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAnnotations {
    /// Module has no observable side effects
    #[serde(default)]
    pub readonly: bool,
    /// Module may irreversibly alter state
    #[serde(default)]
    pub destructive: bool,
    /// Repeat calls with the same arguments are safe
    #[serde(default)]
    pub idempotent: bool,
    /// Module may reach entities outside the closed module set
    #[serde(default = "default_open_world")]
    pub open_world: bool,
    /// A human must approve each call
    #[serde(default)]
    pub requires_approval: bool,
    /// Module can deliver its result as a chunk stream
    #[serde(default)]
    pub streaming: bool,
}

impl Default for ModuleAnnotations {
    fn default() -> Self {
        Self {
            readonly: false,
            destructive: false,
            idempotent: false,
            open_world: true,
            requires_approval: false,
            streaming: false,
        }
    }
}

impl ModuleAnnotations {
    /// Set the readonly flag
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Set the destructive flag
    pub fn destructive(mut self, destructive: bool) -> Self {
        self.destructive = destructive;
        self
    }

    /// Set the idempotent flag
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Set the open-world flag
    pub fn open_world(mut self, open_world: bool) -> Self {
        self.open_world = open_world;
        self
    }

    /// Set the requires-approval flag
    pub fn requires_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    /// Set the streaming flag
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// Neutral description of a callable module, owned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Dot-segmented module id (e.g. `image.resize`)
    #[serde(alias = "module_id")]
    pub id: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON Schema for arguments; may use local `$ref`/`$defs`
    #[serde(default)]
    pub input_schema: Value,
    /// JSON Schema for the result
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output_schema: Value,
    /// Behavioral annotations, absent when the module declares none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ModuleAnnotations>,
    /// Free-form tags used for filtering
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Long-form documentation, exposed as a resource when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl ModuleDescriptor {
    /// Create a descriptor with an input schema and no annotations
    pub fn new<I: Into<String>, D: Into<String>>(id: I, description: D, input_schema: Value) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_schema,
            output_schema: Value::Null,
            annotations: None,
            tags: BTreeSet::new(),
            documentation: None,
        }
    }

    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = output_schema;
        self
    }

    pub fn with_annotations(mut self, annotations: ModuleAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_documentation<S: Into<String>>(mut self, documentation: S) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    /// Whether the module declares the streaming annotation
    pub fn is_streaming(&self) -> bool {
        self.annotations.map_or(false, |a| a.streaming)
    }
}

/// Selection criteria for [`ModuleRegistry::list`](super::ModuleRegistry::list)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFilter {
    /// Module must carry every listed tag
    #[serde(default)]
    pub tags: Vec<String>,
    /// Module id must start with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ModuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Check a descriptor against the filter
    pub fn matches(&self, descriptor: &ModuleDescriptor) -> bool {
        if let Some(prefix) = &self.prefix {
            if !descriptor.id.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.tags.iter().all(|tag| descriptor.tags.contains(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.prefix.is_none()
    }
}

/// Change notification emitted by a registry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// Module added or replaced
    Register {
        module_id: String,
        descriptor: Arc<ModuleDescriptor>,
    },
    /// Module removed
    Unregister { module_id: String },
}

impl RegistryEvent {
    pub fn module_id(&self) -> &str {
        match self {
            RegistryEvent::Register { module_id, .. } => module_id,
            RegistryEvent::Unregister { module_id } => module_id,
        }
    }
}
