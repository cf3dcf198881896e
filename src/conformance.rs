//! Check wire payloads against generated OpenAPI component schemas.

use serde_json::{json, Map, Value};

use crate::error::{ConformanceError, SchemaError};

const COMPONENTS_PREFIX: &str = "#/components/schemas/";
const DEFS_PREFIX: &str = "#/$defs/";

/// Validate `payload` against one component of an OpenAPI document.
///
/// `document` is a document written by the OpenAPI emitter. Component
/// references are rebased onto `$defs` so the component can be compiled as a
/// standalone JSON Schema.
///
/// # Errors
///
/// Returns `ConformanceError::UnknownComponent` if the document has no such
/// component, `ConformanceError::InvalidSchema` if it does not compile, or
/// `ConformanceError::Mismatch` with every violation found.
pub fn check(document: &Value, component: &str, payload: &Value) -> Result<(), ConformanceError> {
    let components = document
        .pointer("/components/schemas")
        .and_then(Value::as_object)
        .filter(|c| c.contains_key(component))
        .ok_or_else(|| ConformanceError::UnknownComponent {
            name: component.to_string(),
        })?;

    let schema = standalone_schema(components, component);
    let validator = jsonschema::validator_for(&schema).map_err(|e| ConformanceError::InvalidSchema {
        message: e.to_string(),
    })?;

    let errors: Vec<SchemaError> = validator
        .iter_errors(payload)
        .map(|e| SchemaError {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConformanceError::Mismatch {
            component: component.to_string(),
            errors,
        })
    }
}

fn standalone_schema(components: &Map<String, Value>, component: &str) -> Value {
    let mut defs = Value::Object(components.clone());
    rebase_refs(&mut defs);
    json!({
        "$defs": defs,
        "$ref": format!("{}{}", DEFS_PREFIX, component)
    })
}

fn rebase_refs(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "$ref" {
                    if let Some(target) = child.as_str().and_then(|r| r.strip_prefix(COMPONENTS_PREFIX)) {
                        *child = Value::String(format!("{}{}", DEFS_PREFIX, target));
                    }
                } else {
                    rebase_refs(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rebase_refs),
        _ => {}
    }
}
