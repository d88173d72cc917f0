//! Example invocations in the `<function_calls>` text convention, synthesised from each
//! function's parameter schema.
//!
//! Object and array values are written as compact JSON (`{"since":"2026-01-01"}`), with no
//! space after `:` or `,`.

use serde_json::{json, Map, Value};

use super::ToolSchema;

/// Objects nested deeper than this are replaced by `{}`, as are `$ref`s reached past it.
const MAX_OBJECT_DEPTH: usize = 3;

pub fn usage_example(schema: &ToolSchema) -> String {
    let parameters = schema.parameters();
    let properties = parameters.get("properties").and_then(Value::as_object);

    let mut lines = vec![
        "<function_calls>".to_string(),
        format!("<invoke name=\"{}\">", schema.declared_name()),
    ];
    for name in required_names(parameters, properties) {
        let property = properties.and_then(|properties| properties.get(&name)).unwrap_or(&Value::Null);
        let value = example_value(property, parameters);
        lines.push(format!("  <parameter name=\"{name}\">{}</parameter>", render(&value)));
    }
    lines.push("</invoke>".to_string());
    lines.push("</function_calls>".to_string());
    lines.join("\n")
}

/// Example value for one parameter shape. `root` resolves local `#/...` references.
pub fn example_value(schema: &Value, root: &Value) -> Value {
    build(schema, root, 0, &[])
}

/// `aliases` holds the references followed since the last object or array step. A reference
/// that repeats inside that chain never reaches a concrete shape and becomes `{}`.
fn build(schema: &Value, root: &Value, depth: usize, aliases: &[&str]) -> Value {
    let Some(shape) = schema.as_object().filter(|shape| !shape.is_empty()) else {
        return json!("example");
    };

    if let Some(reference) = shape.get("$ref").and_then(Value::as_str) {
        if depth > MAX_OBJECT_DEPTH || aliases.iter().any(|seen| *seen == reference) {
            return Value::Object(Map::new());
        }
        return match resolve_ref(reference, root) {
            Some(target) => {
                let chain: Vec<&str> = aliases.iter().copied().chain([reference]).collect();
                build(target, root, depth, &chain)
            }
            None => json!("example"),
        };
    }

    if let Some(example) = shape.get("example").filter(|example| !example.is_null()) {
        return example.clone();
    }
    if let Some(first) = shape.get("enum").and_then(Value::as_array).and_then(|values| values.first()) {
        return first.clone();
    }

    let default = shape.get("default").filter(|default| !default.is_null());
    match shape.get("type").and_then(Value::as_str) {
        Some("string") => match default {
            Some(Value::String(text)) if !text.is_empty() => json!(text),
            _ => json!("example"),
        },
        Some("integer") => default.cloned().unwrap_or_else(|| json!(1)),
        Some("number") => default.cloned().unwrap_or_else(|| json!(1.0)),
        Some("boolean") => default.cloned().unwrap_or_else(|| json!(true)),
        Some("array") => {
            let string_items = json!({"type": "string"});
            let items = shape.get("items").unwrap_or(&string_items);
            Value::Array(vec![build(items, root, depth + 1, &[])])
        }
        Some("object") => {
            if depth > MAX_OBJECT_DEPTH {
                return Value::Object(Map::new());
            }
            let Some(properties) =
                shape.get("properties").and_then(Value::as_object).filter(|props| !props.is_empty())
            else {
                return Value::Object(Map::new());
            };
            required_names(schema, Some(properties))
                .into_iter()
                .map(|name| {
                    let property = properties.get(&name).unwrap_or(&Value::Null);
                    let value = build(property, root, depth + 1, &[]);
                    (name, value)
                })
                .collect::<Map<String, Value>>()
                .into()
        }
        _ => ["anyOf", "oneOf"]
            .iter()
            .find_map(|key| shape.get(*key).and_then(Value::as_array).and_then(|options| options.first()))
            .map(|first| build(first, root, depth + 1, &[]))
            .unwrap_or_else(|| json!("example")),
    }
}

/// `required` when it lists anything, otherwise every declared property.
fn required_names(schema: &Value, properties: Option<&Map<String, Value>>) -> Vec<String> {
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default();
    if !required.is_empty() {
        return required;
    }
    properties.map(|properties| properties.keys().cloned().collect()).unwrap_or_default()
}

fn resolve_ref<'a>(reference: &str, root: &'a Value) -> Option<&'a Value> {
    reference.strip_prefix('#').and_then(|pointer| root.pointer(pointer))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
