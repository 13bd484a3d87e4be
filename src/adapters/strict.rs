//! Strict-mode canonicalization for function-calling exports.
//!
//! Structured-output APIs reject schemas that leave any property optional or
//! allow unknown properties. [`StrictTransformer`] rewrites an already
//! normalized schema so that every object node is closed
//! (`additionalProperties: false`) and requires all of its properties in
//! alphabetical order. Properties that used to be optional are widened to
//! accept `null` instead.
//!
//! `default` values and `x-*` extension keywords are removed at every level,
//! after `x-llm-description` has been promoted to `description`.

use crate::adapters::schema::NormalizedSchema;
use crate::error::{BridgeError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Prefix marking extension keywords
pub const EXTENSION_PREFIX: &str = "x-";

/// Extension keyword holding a model-oriented description
pub const LLM_DESCRIPTION_KEY: &str = "x-llm-description";

const BRANCH_KEYWORDS: &[&str] = &["oneOf", "anyOf", "allOf", "prefixItems"];
const SINGLE_KEYWORDS: &[&str] = &["not", "contains", "if", "then", "else"];

/// Produces fully-closed, fully-required schemas
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictTransformer;

impl StrictTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Canonicalize a normalized schema.
    ///
    /// Cyclic schemas are rejected: the required-property closure of a type
    /// that still refers to itself is not statically known.
    pub fn transform(&self, normalized: &NormalizedSchema) -> Result<Value> {
        if normalized.is_cyclic() {
            let names: Vec<&str> = normalized.cycles.iter().map(String::as_str).collect();
            return Err(BridgeError::schema(format!(
                "Strict mode requires an acyclic schema; recursive definitions: {}",
                names.join(", ")
            )));
        }

        let mut schema = normalized.schema.clone();
        promote_llm_descriptions(&mut schema);
        strict_node(&mut schema);
        Ok(schema)
    }
}

/// Replace `description` with `x-llm-description` wherever both could apply
fn promote_llm_descriptions(node: &mut Value) {
    match node {
        Value::Object(obj) => {
            if let Some(Value::String(text)) = obj.get(LLM_DESCRIPTION_KEY) {
                let text = text.clone();
                obj.insert("description".to_string(), Value::String(text));
            }
            for value in obj.values_mut() {
                promote_llm_descriptions(value);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(promote_llm_descriptions),
        _ => {}
    }
}

fn strict_node(node: &mut Value) {
    let obj = match node {
        Value::Object(obj) => obj,
        Value::Array(items) => {
            items.iter_mut().for_each(strict_node);
            return;
        }
        _ => return,
    };

    obj.retain(|key, _| key != "default" && !key.starts_with(EXTENSION_PREFIX));

    if let Some(Value::Object(props)) = obj.get_mut("properties") {
        props.values_mut().for_each(strict_node);
    }
    if let Some(Value::Object(patterns)) = obj.get_mut("patternProperties") {
        patterns.values_mut().for_each(strict_node);
    }
    if let Some(items) = obj.get_mut("items") {
        strict_node(items);
    }
    for keyword in BRANCH_KEYWORDS.iter().chain(SINGLE_KEYWORDS) {
        if let Some(child) = obj.get_mut(*keyword) {
            strict_node(child);
        }
    }

    if is_object_schema(obj) {
        close_object(obj);
    } else if let Some(additional @ Value::Object(_)) = obj.get_mut("additionalProperties") {
        strict_node(additional);
    }
}

fn is_object_schema(obj: &Map<String, Value>) -> bool {
    if obj.contains_key("properties") {
        return true;
    }
    match obj.get("type") {
        Some(Value::String(t)) => t == "object",
        Some(Value::Array(types)) => types.iter().any(|t| t == "object"),
        _ => false,
    }
}

fn close_object(obj: &mut Map<String, Value>) {
    let originally_required: BTreeSet<String> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let props = obj
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));

    let mut required = Vec::new();
    if let Value::Object(props) = props {
        let names: Vec<String> = props.keys().cloned().collect();
        for name in names {
            if !originally_required.contains(&name) {
                if let Some(prop) = props.remove(&name) {
                    props.insert(name.clone(), make_nullable(prop));
                }
            }
            required.push(name);
        }
    }
    required.sort();

    obj.insert(
        "required".to_string(),
        Value::Array(required.into_iter().map(Value::String).collect()),
    );
    obj.insert("additionalProperties".to_string(), Value::Bool(false));
}

/// Widen a property schema so it also accepts `null`
pub fn make_nullable(schema: Value) -> Value {
    let mut obj = match schema {
        Value::Object(obj) => obj,
        other => return other,
    };

    match obj.get_mut("type") {
        Some(Value::String(t)) => {
            if t != "null" {
                let widened = vec![Value::String(t.clone()), Value::String("null".to_string())];
                obj.insert("type".to_string(), Value::Array(widened));
                add_null_to_enum(&mut obj);
            }
            return Value::Object(obj);
        }
        Some(Value::Array(types)) => {
            if !types.iter().any(|t| t == "null") {
                types.push(Value::String("null".to_string()));
            }
            add_null_to_enum(&mut obj);
            return Value::Object(obj);
        }
        _ => {}
    }

    for keyword in ["anyOf", "oneOf"] {
        if let Some(Value::Array(branches)) = obj.get_mut(keyword) {
            if !branches.iter().any(is_null_schema) {
                branches.push(null_schema());
            }
            return Value::Object(obj);
        }
    }

    let mut wrapped = Map::new();
    if let Some(description) = obj.remove("description") {
        wrapped.insert("description".to_string(), description);
    }
    wrapped.insert(
        "anyOf".to_string(),
        Value::Array(vec![Value::Object(obj), null_schema()]),
    );
    Value::Object(wrapped)
}

fn add_null_to_enum(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(values)) = obj.get_mut("enum") {
        if !values.iter().any(Value::is_null) {
            values.push(Value::Null);
        }
    }
}

fn null_schema() -> Value {
    serde_json::json!({"type": "null"})
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}
