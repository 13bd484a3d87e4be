//! Function-calling export
//!
//! Converts module descriptors to OpenAI `tools` entries, either from the
//! listener's live snapshot or straight from a registry.

use crate::adapters::{AnnotationMapper, ModuleIdNormalizer, SchemaConverter, StrictTransformer};
use crate::error::Result;
use crate::openai::types::{CyclicSchemaPolicy, ExportOptions, OpenAiFunction, OpenAiTool};
use crate::registry::{ModuleDescriptor, ModuleRegistry};
use crate::server::listener::RegistrySnapshot;
use tracing::{debug, info, warn};

/// Converts descriptors to function-calling tool definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiConverter {
    schema_converter: SchemaConverter,
    strict_transformer: StrictTransformer,
    annotation_mapper: AnnotationMapper,
    normalizer: ModuleIdNormalizer,
}

impl OpenAiConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export every snapshot entry matching the options' filter, ordered by module id
    pub fn to_tool_definitions(&self, snapshot: &RegistrySnapshot, options: &ExportOptions) -> Vec<OpenAiTool> {
        let tools = self.collect(
            snapshot
                .entries()
                .filter(|entry| options.filter.matches(&entry.descriptor))
                .map(|entry| entry.descriptor.as_ref()),
            options,
        );
        info!("Exported {} function-calling tools from snapshot", tools.len());
        tools
    }

    /// Export straight from a registry, filtering through `registry.list`
    pub fn convert_registry(&self, registry: &dyn ModuleRegistry, options: &ExportOptions) -> Vec<OpenAiTool> {
        let descriptors: Vec<_> = registry
            .list(&options.filter)
            .into_iter()
            .filter_map(|module_id| {
                let descriptor = registry.get_definition(&module_id);
                if descriptor.is_none() {
                    debug!(module_id = %module_id, "Skipped module: no definition found");
                }
                descriptor
            })
            .collect();

        self.collect(descriptors.iter().map(|d| d.as_ref()), options)
    }

    fn collect<'a, I>(&self, descriptors: I, options: &ExportOptions) -> Vec<OpenAiTool>
    where
        I: Iterator<Item = &'a ModuleDescriptor>,
    {
        descriptors
            .filter_map(|descriptor| match self.convert_descriptor(descriptor, options) {
                Ok(tool) => Some(tool),
                Err(e) => {
                    warn!(module_id = %descriptor.id, "Module left out of export: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Convert one descriptor.
    ///
    /// Fails for invalid ids and unresolvable schemas, and for recursive
    /// schemas in strict mode when the policy is [`CyclicSchemaPolicy::Omit`].
    pub fn convert_descriptor(&self, descriptor: &ModuleDescriptor, options: &ExportOptions) -> Result<OpenAiTool> {
        let name = self.normalizer.normalize(&descriptor.id)?;
        let normalized = self.schema_converter.convert(&descriptor.input_schema)?;

        let (parameters, strict) = match (options.strict, normalized.is_cyclic(), options.cyclic_policy) {
            (false, _, _) => (normalized.schema, None),
            (true, true, CyclicSchemaPolicy::BestEffort) => {
                debug!(module_id = %descriptor.id, "Exporting recursive schema without strict mode");
                (normalized.schema, None)
            }
            // The transformer rejects recursive schemas
            (true, _, _) => (self.strict_transformer.transform(&normalized)?, Some(true)),
        };

        let mut description = descriptor.description.clone();
        if options.embed_annotations {
            description.push_str(
                &self
                    .annotation_mapper
                    .to_description_suffix(descriptor.annotations.as_ref()),
            );
        }

        Ok(OpenAiTool::function(OpenAiFunction {
            name,
            description,
            parameters,
            strict,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::registry::ModuleAnnotations;
    use serde_json::json;

    fn recursive() -> ModuleDescriptor {
        ModuleDescriptor::new(
            "tree.walk",
            "Walk a tree",
            json!({
                "properties": {"root": {"$ref": "#/$defs/Node"}},
                "$defs": {"Node": {"type": "object", "properties": {"next": {"$ref": "#/$defs/Node"}}}}
            }),
        )
    }

    #[test]
    fn test_strict_export_of_image_resize() {
        let descriptor = ModuleDescriptor::new(
            "image.resize",
            "Resize an image",
            json!({"type": "object", "properties": {"w": {"type": "integer"}}, "required": []}),
        );
        let tool = OpenAiConverter::new()
            .convert_descriptor(&descriptor, &ExportOptions::new().strict(true))
            .unwrap();

        assert_eq!(tool.tool_type, "function");
        assert_eq!(tool.function.name, "image-resize");
        assert_eq!(tool.function.strict, Some(true));
        assert_eq!(tool.function.parameters["properties"]["w"]["type"], json!(["integer", "null"]));
        assert_eq!(tool.function.parameters["required"], json!(["w"]));
    }

    #[test]
    fn test_non_strict_export_omits_strict_field() {
        let descriptor = ModuleDescriptor::new("a.b", "d", json!({}));
        let tool = OpenAiConverter::new()
            .convert_descriptor(&descriptor, &ExportOptions::new())
            .unwrap();
        let value = serde_json::to_value(&tool).unwrap();
        assert!(value["function"].get("strict").is_none());
        assert_eq!(value["function"]["parameters"], json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn test_embedded_annotations() {
        let descriptor = ModuleDescriptor::new("fs.delete", "Delete a file", json!({}))
            .with_annotations(ModuleAnnotations::default().destructive(true));
        let converter = OpenAiConverter::new();

        let plain = converter.convert_descriptor(&descriptor, &ExportOptions::new()).unwrap();
        assert_eq!(plain.function.description, "Delete a file");

        let embedded = converter
            .convert_descriptor(&descriptor, &ExportOptions::new().embed_annotations(true))
            .unwrap();
        assert!(embedded
            .function
            .description
            .ends_with("[Annotations: destructive=true, idempotent=false, open_world=true, readonly=false, requires_approval=false]"));
    }

    #[test]
    fn test_cyclic_policy_omit_rejects() {
        let err = OpenAiConverter::new()
            .convert_descriptor(&recursive(), &ExportOptions::new().strict(true))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Schema { .. }));
    }

    #[test]
    fn test_cyclic_policy_best_effort_exports_non_strict() {
        let options = ExportOptions::new()
            .strict(true)
            .cyclic_policy(CyclicSchemaPolicy::BestEffort);
        let tool = OpenAiConverter::new().convert_descriptor(&recursive(), &options).unwrap();
        assert!(tool.function.strict.is_none());
        assert!(tool.function.parameters["$defs"].get("Node").is_some());
    }

    #[test]
    fn test_cyclic_schema_fine_when_not_strict() {
        let tool = OpenAiConverter::new()
            .convert_descriptor(&recursive(), &ExportOptions::new())
            .unwrap();
        assert!(tool.function.strict.is_none());
    }
}
