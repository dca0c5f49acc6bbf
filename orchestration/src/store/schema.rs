//! JSON-Schema subset validation.
//!
//! Supports `type`, `required`, `properties` and `items` — the subset channel
//! schemas actually use. Validation fails closed: an unrecognised `type`
//! keyword or a malformed schema rejects the document rather than waving it
//! through.

use serde_json::Value;

use super::{StoreError, StoreResult};

/// A parsed schema document. Wraps the raw JSON so schemas stay data, not
/// Rust types.
#[derive(Debug, Clone)]
pub struct Schema {
    raw: Value,
}

impl Schema {
    /// Wrap a schema document. The document itself is checked during
    /// [`validate`] — a malformed schema rejects every instance.
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Validate `instance` against `schema`, failing closed.
pub fn validate(schema: &Schema, instance: &Value) -> StoreResult<()> {
    validate_node(&schema.raw, instance, "$")
}

fn validate_node(schema: &Value, instance: &Value, pointer: &str) -> StoreResult<()> {
    let obj = match schema {
        Value::Object(obj) => obj,
        // A schema node must be an object; anything else is a malformed
        // schema and rejects the instance.
        _ => {
            return Err(invalid(pointer, "schema node is not an object"));
        }
    };

    if let Some(ty) = obj.get("type") {
        let ty = ty
            .as_str()
            .ok_or_else(|| invalid(pointer, "schema `type` is not a string"))?;
        check_type(ty, instance, pointer)?;
    }

    if let Some(required) = obj.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| invalid(pointer, "schema `required` is not an array"))?;
        let map = match instance {
            Value::Object(map) => map,
            _ => {
                return Err(invalid(
                    pointer,
                    "`required` applies to a non-object instance",
                ));
            }
        };
        for key in required {
            let key = key
                .as_str()
                .ok_or_else(|| invalid(pointer, "`required` entry is not a string"))?;
            if !map.contains_key(key) {
                return Err(invalid(pointer, format!("missing required property `{key}`")));
            }
        }
    }

    if let Some(properties) = obj.get("properties") {
        let properties = properties
            .as_object()
            .ok_or_else(|| invalid(pointer, "schema `properties` is not an object"))?;
        if let Value::Object(map) = instance {
            for (key, subschema) in properties {
                if let Some(subinstance) = map.get(key) {
                    validate_node(subschema, subinstance, &format!("{pointer}.{key}"))?;
                }
            }
        }
    }

    if let Some(items) = obj.get("items") {
        if let Value::Array(elements) = instance {
            for (i, element) in elements.iter().enumerate() {
                validate_node(items, element, &format!("{pointer}[{i}]"))?;
            }
        }
    }

    Ok(())
}

fn check_type(ty: &str, instance: &Value, pointer: &str) -> StoreResult<()> {
    let matches = match ty {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "number" => instance.is_number(),
        "integer" => instance.is_i64() || instance.is_u64(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        // Unknown type keyword: fail closed.
        other => {
            return Err(invalid(pointer, format!("unsupported schema type `{other}`")));
        }
    };
    if matches {
        Ok(())
    } else {
        Err(invalid(
            pointer,
            format!("expected type `{ty}`, got `{}`", type_name(instance)),
        ))
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

fn invalid(pointer: &str, detail: impl Into<String>) -> StoreError {
    StoreError::SchemaInvalid {
        pointer: pointer.to_string(),
        detail: detail.into(),
    }
}
