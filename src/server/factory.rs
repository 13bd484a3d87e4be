//! Tool construction from module descriptors

use crate::adapters::{AnnotationMapper, ModuleIdNormalizer, SchemaConverter};
use crate::error::Result;
use crate::mcp::{ArgumentValidator, Tool};
use crate::registry::ModuleDescriptor;
use serde::{Deserialize, Serialize};

/// Protocol-facing naming of tools on the tool-calling surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolNaming {
    /// Expose the module id verbatim (`image.resize`)
    #[default]
    ModuleId,
    /// Expose the normalized function name (`image-resize`)
    Normalized,
}

/// A tool plus what was learned while building it
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTool {
    pub tool: Tool,
    /// Input schema kept a recursive `$ref`
    pub cyclic: bool,
    /// Input schema compiled once at build time
    pub validator: ArgumentValidator,
}

/// Composes schema, annotation and id transforms into [`Tool`]s
#[derive(Debug, Clone, Default)]
pub struct ToolBuilder {
    naming: ToolNaming,
    schema_converter: SchemaConverter,
    annotation_mapper: AnnotationMapper,
    normalizer: ModuleIdNormalizer,
}

impl ToolBuilder {
    pub fn new(naming: ToolNaming) -> Self {
        Self {
            naming,
            ..Default::default()
        }
    }

    pub fn naming(&self) -> ToolNaming {
        self.naming
    }

    /// Protocol-facing name for a module id
    pub fn tool_name(&self, module_id: &str) -> Result<String> {
        match self.naming {
            ToolNaming::ModuleId => {
                self.normalizer.validate(module_id)?;
                Ok(module_id.to_string())
            }
            ToolNaming::Normalized => self.normalizer.normalize(module_id),
        }
    }

    /// Build the tool for one descriptor
    pub fn build(&self, descriptor: &ModuleDescriptor) -> Result<BuiltTool> {
        let name = self.tool_name(&descriptor.id)?;
        let input = self.schema_converter.convert(&descriptor.input_schema)?;
        let output_schema = if descriptor.output_schema.is_null() {
            None
        } else {
            Some(self.schema_converter.convert(&descriptor.output_schema)?.schema)
        };

        let annotations = descriptor.annotations.as_ref();
        let description = (!descriptor.description.trim().is_empty()).then(|| descriptor.description.clone());

        let tool = Tool {
            name,
            description,
            title: None,
            input_schema: input.schema,
            output_schema,
            annotations: Some(self.annotation_mapper.to_mcp(annotations)),
            meta: self.annotation_mapper.to_meta(annotations),
        };
        let validator = tool.compile_validator()?;

        Ok(BuiltTool {
            cyclic: !input.cycles.is_empty(),
            tool,
            validator,
        })
    }
}
