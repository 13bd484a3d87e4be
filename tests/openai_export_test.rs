//! Integration tests for function-calling exports

use serde_json::json;
use toolbridge::openai::{CyclicSchemaPolicy, ExportOptions, OpenAiConverter};
use toolbridge::registry::{InMemoryRegistry, ModuleAnnotations, ModuleDescriptor, ModuleFilter};
use toolbridge::server::{RegistryListener, ToolBuilder};
use toolbridge::adapters::TOOL_NAME_PATTERN;
use toolbridge::to_openai_tools;

fn registry() -> InMemoryRegistry {
    let registry = InMemoryRegistry::new();
    registry
        .register(
            ModuleDescriptor::new(
                "image.resize",
                "Resize an image",
                json!({
                    "type": "object",
                    "properties": {
                        "width": {"type": "integer", "default": 100},
                        "mode": {"type": "string", "enum": ["fit", "fill"], "x-llm-description": "How to scale"}
                    },
                    "required": ["width"]
                }),
            )
            .with_tags(["image"])
            .with_annotations(ModuleAnnotations::default().idempotent(true)),
        )
        .unwrap();
    registry
        .register(
            ModuleDescriptor::new(
                "tree.walk",
                "Walk a tree",
                json!({
                    "properties": {"root": {"$ref": "#/$defs/Node"}},
                    "$defs": {
                        "Node": {
                            "type": "object",
                            "properties": {"children": {"type": "array", "items": {"$ref": "#/$defs/Node"}}}
                        }
                    }
                }),
            )
            .with_tags(["graph"]),
        )
        .unwrap();
    registry
        .register(ModuleDescriptor::new("my-team.text-upper", "Uppercase", json!({})).with_tags(["text"]))
        .unwrap();
    registry
}

#[cfg(test)]
mod openai_export_tests {
    use super::*;

    #[test]
    fn test_registry_export_names_and_order() {
        let tools = to_openai_tools(&registry(), &ExportOptions::new());
        let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();

        assert_eq!(names, vec!["image-resize", "my--team-text--upper", "tree-walk"]);
        assert!(names.iter().all(|name| TOOL_NAME_PATTERN.is_match(name)));
        assert!(tools.iter().all(|t| t.function.strict.is_none()));
    }

    #[test]
    fn test_strict_export_omits_recursive_modules() {
        let tools = to_openai_tools(&registry(), &ExportOptions::new().strict(true));
        let names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(names, vec!["image-resize", "my--team-text--upper"]);

        let resize = &tools[0].function;
        assert_eq!(resize.strict, Some(true));
        assert_eq!(resize.parameters["additionalProperties"], false);
        assert_eq!(resize.parameters["required"], json!(["mode", "width"]));
        assert!(resize.parameters["properties"]["width"].get("default").is_none());
        assert_eq!(resize.parameters["properties"]["mode"]["description"], "How to scale");
        assert_eq!(resize.parameters["properties"]["mode"]["enum"], json!(["fit", "fill", null]));
    }

    #[test]
    fn test_best_effort_keeps_recursive_modules() {
        let options = ExportOptions::new()
            .strict(true)
            .cyclic_policy(CyclicSchemaPolicy::BestEffort);
        let tools = to_openai_tools(&registry(), &options);

        let walk = tools.iter().find(|t| t.function.name == "tree-walk").unwrap();
        assert!(walk.function.strict.is_none());
        let root = &walk.function.parameters["properties"]["root"];
        assert_eq!(root["properties"]["children"]["items"]["$ref"], "#/$defs/Node");
        assert!(walk.function.parameters["$defs"].get("Node").is_some());
    }

    #[test]
    fn test_filter_and_annotation_embedding() {
        let options = ExportOptions::new()
            .embed_annotations(true)
            .with_filter(ModuleFilter::new().with_tags(["image"]));
        let tools = to_openai_tools(&registry(), &options);

        assert_eq!(tools.len(), 1);
        assert!(tools[0].function.description.starts_with("Resize an image\n\n[Annotations: "));
        assert!(tools[0].function.description.contains("idempotent=true"));
    }

    #[test]
    fn test_snapshot_and_registry_exports_agree() {
        let registry = registry();
        let listener = RegistryListener::new(ToolBuilder::default());
        listener.sync(&registry);

        let options = ExportOptions::new().strict(true);
        let from_snapshot = OpenAiConverter::new().to_tool_definitions(&listener.snapshot(), &options);
        let from_registry = to_openai_tools(&registry, &options);
        assert_eq!(from_snapshot, from_registry);
    }

    #[test]
    fn test_export_serializes_as_tools_array() {
        let tools = to_openai_tools(&registry(), &ExportOptions::new().strict(true));
        let wire = serde_json::to_value(&tools).unwrap();
        assert_eq!(wire[0]["type"], "function");
        assert_eq!(wire[0]["function"]["strict"], true);
    }
}
