//! Schema normalization: inline local `$ref` pointers and drop `$defs`.
//!
//! Module descriptors declare their input/output schemas as JSON Schema trees
//! that may reference shared definitions (`#/$defs/Name`). Tool-calling
//! clients expect self-contained schemas, so [`SchemaConverter`] walks the tree
//! depth-first and splices each referenced definition in place of its `$ref`.
//!
//! Recursive definitions cannot be inlined. The walk keeps the stack of
//! definition names currently being inlined in a [`SchemaGraph`]; a `$ref` to a
//! name already on that stack is left in place and the result is flagged
//! cyclic. The definitions targeted by preserved references stay under `$defs`
//! so the cyclic schema still resolves on its own.

use crate::error::{BridgeError, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const DEFS_PREFIX: &str = "#/$defs/";
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Keywords holding a map of name -> subschema
const SCHEMA_MAP_KEYWORDS: &[&str] = &["properties", "patternProperties", "dependentSchemas"];

/// Keywords holding an array of subschemas
const SCHEMA_ARRAY_KEYWORDS: &[&str] = &["oneOf", "anyOf", "allOf", "prefixItems"];

/// Keywords holding a single subschema
const SCHEMA_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "not",
    "contains",
    "if",
    "then",
    "else",
    "propertyNames",
];

/// Result of normalizing one schema
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSchema {
    /// The converted, self-contained schema
    pub schema: Value,
    /// Definition names whose references were kept because inlining them would recurse forever
    pub cycles: BTreeSet<String>,
}

impl NormalizedSchema {
    /// Whether any `$ref` was deliberately preserved
    pub fn is_cyclic(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Working state for one normalization pass.
///
/// `path` is the stack of definition names being inlined at the current point
/// of the walk; it is the only thing consulted for cycle detection.
#[derive(Debug)]
pub struct SchemaGraph<'a> {
    defs: &'a Map<String, Value>,
    path: Vec<String>,
    cycles: BTreeSet<String>,
}

impl<'a> SchemaGraph<'a> {
    pub fn new(defs: &'a Map<String, Value>) -> Self {
        Self {
            defs,
            path: Vec::new(),
            cycles: BTreeSet::new(),
        }
    }

    /// Push `name` onto the visitation path.
    ///
    /// Returns `false` (and records a cycle) when `name` is already being inlined.
    pub fn enter(&mut self, name: &str) -> bool {
        if self.path.iter().any(|entry| entry == name) {
            self.cycles.insert(name.to_string());
            return false;
        }
        self.path.push(name.to_string());
        true
    }

    /// Pop the innermost definition name
    pub fn leave(&mut self) {
        self.path.pop();
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn cycles(&self) -> &BTreeSet<String> {
        &self.cycles
    }

    fn definition(&self, name: &str) -> Result<&'a Value> {
        self.defs
            .get(name)
            .ok_or_else(|| BridgeError::schema(format!("Definition not found: {}", name)))
    }

    /// Resolve every local reference below `node`
    pub fn resolve(&mut self, node: &Value) -> Result<Value> {
        let obj = match node {
            Value::Object(obj) => obj,
            Value::Array(items) => {
                return items.iter().map(|item| self.resolve(item)).collect::<Result<Vec<_>>>().map(Value::Array)
            }
            other => return Ok(other.clone()),
        };

        if let Some(reference) = obj.get("$ref") {
            let reference = reference
                .as_str()
                .ok_or_else(|| BridgeError::schema("$ref must be a string"))?;
            return self.resolve_reference(reference, obj);
        }

        self.resolve_keywords(obj).map(Value::Object)
    }

    fn resolve_reference(&mut self, reference: &str, node: &Map<String, Value>) -> Result<Value> {
        let name = definition_name(reference)?;
        let definition = self.definition(name)?;

        if !self.enter(name) {
            // Keep the reference, but rewrite it to the canonical location we retain
            let mut kept = node.clone();
            kept.remove("$defs");
            kept.insert("$ref".to_string(), Value::String(format!("{}{}", DEFS_PREFIX, name)));
            return Ok(Value::Object(kept));
        }
        let resolved = self.resolve(definition);
        self.leave();
        let mut resolved = resolved?;

        // Keywords written next to the $ref (usually a description) win over the definition's
        let siblings: Vec<(&String, &Value)> = node
            .iter()
            .filter(|(key, _)| key.as_str() != "$ref" && key.as_str() != "$defs")
            .collect();
        if !siblings.is_empty() {
            if let Value::Bool(_) = resolved {
                let mut wrapped = Map::new();
                wrapped.insert("allOf".to_string(), Value::Array(vec![resolved]));
                resolved = Value::Object(wrapped);
            }
            if let Value::Object(ref mut target) = resolved {
                for (key, value) in siblings {
                    let value = self.resolve_keyword(key, value)?;
                    target.insert(key.clone(), value);
                }
            }
        }
        Ok(resolved)
    }

    fn resolve_keywords(&mut self, obj: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::with_capacity(obj.len());
        for (key, value) in obj {
            if key == "$defs" || key == "definitions" {
                continue;
            }
            out.insert(key.clone(), self.resolve_keyword(key, value)?);
        }
        Ok(out)
    }

    /// Recurse only into keywords whose values are subschemas; everything else passes through
    fn resolve_keyword(&mut self, key: &str, value: &Value) -> Result<Value> {
        if SCHEMA_MAP_KEYWORDS.contains(&key) {
            if let Value::Object(entries) = value {
                let mut out = Map::with_capacity(entries.len());
                for (name, schema) in entries {
                    out.insert(name.clone(), self.resolve(schema)?);
                }
                return Ok(Value::Object(out));
            }
            return Ok(value.clone());
        }
        if SCHEMA_ARRAY_KEYWORDS.contains(&key) {
            if let Value::Array(_) = value {
                return self.resolve(value);
            }
            return Ok(value.clone());
        }
        if key == "items" || SCHEMA_KEYWORDS.contains(&key) {
            return match value {
                Value::Object(_) | Value::Array(_) => self.resolve(value),
                other => Ok(other.clone()),
            };
        }
        Ok(value.clone())
    }
}

/// Extract the definition name from a local `$ref`
fn definition_name(reference: &str) -> Result<&str> {
    reference
        .strip_prefix(DEFS_PREFIX)
        .or_else(|| reference.strip_prefix(DEFINITIONS_PREFIX))
        .filter(|name| !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| BridgeError::schema(format!("Unsupported $ref format: {}", reference)))
}

/// Converts module schemas into self-contained tool schemas
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaConverter;

impl SchemaConverter {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a descriptor schema into a standalone object schema
    pub fn convert(&self, schema: &Value) -> Result<NormalizedSchema> {
        let root = match schema {
            Value::Null => return Ok(Self::empty()),
            Value::Object(obj) if obj.is_empty() => return Ok(Self::empty()),
            Value::Object(obj) => obj,
            other => {
                return Err(BridgeError::schema(format!(
                    "Root schema must be an object, got {}",
                    json_type_name(other)
                )))
            }
        };

        let defs = collect_definitions(root);
        let mut graph = SchemaGraph::new(&defs);
        let mut converted = graph.resolve(schema)?;
        let cycles = graph.cycles().clone();

        if let Value::Object(ref mut obj) = converted {
            if !cycles.is_empty() {
                obj.insert("$defs".to_string(), Value::Object(retained_definitions(&defs, &cycles)?));
            }
            ensure_object_type(obj);
        }

        Ok(NormalizedSchema {
            schema: converted,
            cycles,
        })
    }

    fn empty() -> NormalizedSchema {
        NormalizedSchema {
            schema: serde_json::json!({"type": "object", "properties": {}}),
            cycles: BTreeSet::new(),
        }
    }
}

/// `$defs` and legacy `definitions` merged, `$defs` winning on name clashes
fn collect_definitions(root: &Map<String, Value>) -> Map<String, Value> {
    let mut defs = Map::new();
    for keyword in ["definitions", "$defs"] {
        if let Some(Value::Object(entries)) = root.get(keyword) {
            for (name, schema) in entries {
                defs.insert(name.clone(), schema.clone());
            }
        }
    }
    defs
}

/// Normalize each definition that a preserved reference still points at.
///
/// Definitions reached from a retained body may cycle back to other names, so
/// this keeps going until every referenced name is present.
fn retained_definitions(defs: &Map<String, Value>, cycles: &BTreeSet<String>) -> Result<Map<String, Value>> {
    let mut pending: Vec<String> = cycles.iter().cloned().collect();
    let mut retained: BTreeMap<String, Value> = BTreeMap::new();

    while let Some(name) = pending.pop() {
        if retained.contains_key(&name) {
            continue;
        }
        let mut graph = SchemaGraph::new(defs);
        graph.enter(&name);
        let definition = graph.definition(&name)?;
        let body = graph.resolve(definition)?;
        for target in graph.cycles() {
            if !retained.contains_key(target) {
                pending.push(target.clone());
            }
        }
        retained.insert(name, body);
    }

    Ok(retained.into_iter().collect())
}

fn ensure_object_type(schema: &mut Map<String, Value>) {
    if !schema.contains_key("type") || schema.contains_key("properties") {
        schema.insert("type".to_string(), Value::String("object".to_string()));
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether `$ref` appears anywhere in the tree
pub fn contains_ref(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.contains_key("$ref") || obj.values().any(contains_ref),
        Value::Array(items) => items.iter().any(contains_ref),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn convert(schema: Value) -> NormalizedSchema {
        SchemaConverter::new().convert(&schema).unwrap()
    }

    #[test]
    fn test_empty_schema_becomes_empty_object() {
        assert_eq!(convert(json!({})).schema, json!({"type": "object", "properties": {}}));
        assert_eq!(convert(Value::Null).schema, json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn test_missing_root_type_is_added() {
        let result = convert(json!({"properties": {"name": {"type": "string"}}}));
        assert_eq!(result.schema["type"], "object");
    }

    #[test]
    fn test_refs_inlined_and_defs_removed() {
        let result = convert(json!({
            "type": "object",
            "properties": {
                "steps": {"type": "array", "items": {"$ref": "#/$defs/Step"}},
                "origin": {"$ref": "#/$defs/Point", "description": "Start point"}
            },
            "$defs": {
                "Step": {"type": "object", "properties": {"at": {"$ref": "#/$defs/Point"}}},
                "Point": {"type": "object", "properties": {"x": {"type": "number"}}}
            }
        }));

        assert!(!result.is_cyclic());
        assert!(!contains_ref(&result.schema));
        assert!(result.schema.get("$defs").is_none());
        assert_eq!(
            result.schema["properties"]["steps"]["items"]["properties"]["at"]["properties"]["x"]["type"],
            "number"
        );
        assert_eq!(result.schema["properties"]["origin"]["description"], "Start point");
        assert_eq!(result.schema["properties"]["origin"]["type"], "object");
    }

    #[test]
    fn test_combinators_and_pattern_properties_are_visited() {
        let result = convert(json!({
            "type": "object",
            "properties": {
                "shape": {"oneOf": [{"$ref": "#/$defs/Circle"}, {"type": "null"}]},
                "all": {"allOf": [{"$ref": "#/$defs/Circle"}]},
                "any": {"anyOf": [{"$ref": "#/$defs/Circle"}]},
                "tuple": {"prefixItems": [{"$ref": "#/$defs/Circle"}]}
            },
            "patternProperties": {"^x-": {"$ref": "#/$defs/Circle"}},
            "$defs": {"Circle": {"type": "object", "properties": {"r": {"type": "number"}}}}
        }));
        assert!(!contains_ref(&result.schema));
        assert_eq!(result.schema["properties"]["shape"]["oneOf"][0]["properties"]["r"]["type"], "number");
        assert_eq!(result.schema["patternProperties"]["^x-"]["type"], "object");
    }

    #[test]
    fn test_unknown_keywords_pass_through() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "x-custom": {"$ref": "not-a-schema"},
            "examples": [{"a": "b"}]
        });
        let result = convert(schema.clone());
        assert_eq!(result.schema["x-custom"], schema["x-custom"]);
        assert_eq!(result.schema["examples"], schema["examples"]);
    }

    #[test]
    fn test_self_referencing_definition_is_flagged() {
        let result = convert(json!({
            "type": "object",
            "properties": {"root": {"$ref": "#/$defs/Node"}},
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": {"type": "string"},
                        "children": {"type": "array", "items": {"$ref": "#/$defs/Node"}}
                    }
                }
            }
        }));

        assert!(result.is_cyclic());
        assert_eq!(result.cycles, BTreeSet::from(["Node".to_string()]));
        let root = &result.schema["properties"]["root"];
        assert_eq!(root["properties"]["value"]["type"], "string");
        assert_eq!(root["properties"]["children"]["items"], json!({"$ref": "#/$defs/Node"}));
        assert!(result.schema["$defs"]["Node"].is_object());
    }

    #[test]
    fn test_mutual_recursion_retains_every_target() {
        let result = convert(json!({
            "type": "object",
            "properties": {"a": {"$ref": "#/$defs/A"}},
            "$defs": {
                "A": {"type": "object", "properties": {"b": {"$ref": "#/$defs/B"}}},
                "B": {"type": "object", "properties": {"a": {"$ref": "#/$defs/A"}}}
            }
        }));
        assert!(result.is_cyclic());
        assert_eq!(result.cycles, BTreeSet::from(["A".to_string()]));
        let a = &result.schema["properties"]["a"];
        assert_eq!(a["properties"]["b"]["properties"]["a"], json!({"$ref": "#/$defs/A"}));
        let defs = result.schema["$defs"].as_object().unwrap();
        assert_eq!(defs.keys().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(defs["A"]["properties"]["b"]["properties"]["a"], json!({"$ref": "#/$defs/A"}));
    }

    #[test]
    fn test_missing_definition_is_an_error() {
        let err = SchemaConverter::new()
            .convert(&json!({"properties": {"a": {"$ref": "#/$defs/Missing"}}}))
            .unwrap_err();
        assert!(err.to_string().contains("Definition not found: Missing"));
    }

    #[test]
    fn test_remote_ref_is_an_error() {
        let err = SchemaConverter::new()
            .convert(&json!({"properties": {"a": {"$ref": "https://example.com/s.json"}}}))
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported $ref format"));
    }

    #[test]
    fn test_graph_path_tracks_nesting() {
        let defs = Map::new();
        let mut graph = SchemaGraph::new(&defs);
        assert!(graph.enter("A"));
        assert!(graph.enter("B"));
        assert_eq!(graph.path(), ["A".to_string(), "B".to_string()]);
        assert!(!graph.enter("A"));
        assert!(graph.cycles().contains("A"));
        graph.leave();
        assert!(graph.enter("C"));
        assert_eq!(graph.path(), ["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_source_schema_is_not_modified() {
        let schema = json!({"properties": {"a": {"$ref": "#/$defs/A"}}, "$defs": {"A": {"type": "string"}}});
        let before = schema.clone();
        let _ = SchemaConverter::new().convert(&schema).unwrap();
        assert_eq!(schema, before);
    }

    fn leaf_schema() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(json!({"type": "string"})),
            Just(json!({"type": "integer", "minimum": 0})),
            Just(json!({"$ref": "#/$defs/Leaf"})),
            Just(json!({"type": "boolean", "default": true})),
        ]
    }

    fn tree_schema() -> impl Strategy<Value = Value> {
        leaf_schema().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::btree_map("[a-d]", inner.clone(), 1..4).prop_map(|props| {
                    json!({"type": "object", "properties": props})
                }),
                inner.clone().prop_map(|items| json!({"type": "array", "items": items})),
                proptest::collection::vec(inner, 1..3).prop_map(|branches| json!({"anyOf": branches})),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_acyclic_normalization_is_idempotent_and_ref_free(body in tree_schema()) {
            let schema = json!({
                "type": "object",
                "properties": {"body": body},
                "$defs": {"Leaf": {"type": "object", "properties": {"id": {"type": "string"}}}}
            });
            let converter = SchemaConverter::new();
            let once = converter.convert(&schema).unwrap();
            prop_assert!(!once.is_cyclic());
            prop_assert!(!contains_ref(&once.schema));
            prop_assert!(once.schema.get("$defs").is_none());
            let twice = converter.convert(&once.schema).unwrap();
            prop_assert_eq!(twice, once);
        }
    }
}
