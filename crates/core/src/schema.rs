//! Tool argument validation against a JSON-Schema subset.
//!
//! Models frequently send `"5"` where a number is declared or `"true"` for a
//! boolean. [`validate_arguments`] coerces such scalars to the declared type
//! and then checks `type`, `properties`, `required`, `items`, `enum` and
//! `additionalProperties: false`. Other keywords are ignored.

use serde_json::{Map, Number, Value};

/// Validate and coerce `args` against `schema`, returning the coerced value.
///
/// The error string lists every violation, one per line, each prefixed with
/// the JSON path it refers to.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<Value, String> {
    let mut errors = Vec::new();
    let coerced = check(schema, args.clone(), "root", &mut errors);
    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors.join("\n"))
    }
}

fn check(schema: &Value, value: Value, path: &str, errors: &mut Vec<String>) -> Value {
    let Some(schema) = schema.as_object() else {
        return value;
    };

    let value = match declared_types(schema) {
        Some(types) => match coerce(value, &types) {
            Ok(v) => v,
            Err(v) => {
                errors.push(format!(
                    "{path}: expected {}, got {}",
                    types.join(" | "),
                    type_name(&v)
                ));
                return v;
            }
        },
        None => value,
    };

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(&value) {
            errors.push(format!("{path}: must be one of {}", Value::Array(allowed.clone())));
        }
    }

    match value {
        Value::Object(map) => Value::Object(check_object(schema, map, path, errors)),
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| check(item_schema, item, &format!("{path}[{i}]"), errors))
                    .collect(),
            ),
            None => Value::Array(items),
        },
        other => other,
    }
}

fn check_object(
    schema: &Map<String, Value>,
    mut map: Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) -> Map<String, Value> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                errors.push(format!("{path}: missing required property '{name}'"));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    let keys: Vec<String> = map.keys().cloned().collect();
    for key in keys {
        let child_path = format!("{path}.{key}");
        match properties.and_then(|p| p.get(&key)) {
            Some(prop_schema) => {
                if let Some(value) = map.remove(&key) {
                    let checked = check(prop_schema, value, &child_path, errors);
                    map.insert(key, checked);
                }
            }
            None if closed => errors.push(format!("{child_path}: unexpected property")),
            None => {}
        }
    }
    map
}

fn declared_types(schema: &Map<String, Value>) -> Option<Vec<&str>> {
    match schema.get("type")? {
        Value::String(t) => Some(vec![t.as_str()]),
        Value::Array(ts) => Some(ts.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Return the value unchanged if it already matches, a coerced value if a
/// lossless coercion exists, or the original value as `Err`.
fn coerce(value: Value, types: &[&str]) -> Result<Value, Value> {
    if types.iter().any(|t| matches_type(&value, t)) {
        return Ok(value);
    }
    for t in types {
        if let Some(coerced) = coerce_to(&value, t) {
            return Ok(coerced);
        }
    }
    Err(value)
}

fn matches_type(value: &Value, t: &str) -> bool {
    match t {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn coerce_to(value: &Value, t: &str) -> Option<Value> {
    match (t, value) {
        ("number", Value::String(s)) => {
            let f: f64 = s.trim().parse().ok()?;
            Number::from_f64(f).map(Value::Number)
        }
        ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        ("boolean", Value::String(s)) => match s.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
        ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),
        ("null", Value::String(s)) if s.is_empty() => Some(Value::Null),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
