//! Argument validation and payload shaping shared by every Studio tool

use serde_json::{Map, Value};

use crate::errors::AppError;

/// Checks `arguments` against a tool's input schema and returns the payload
/// sent to the plugin: only declared properties, with schema defaults filled in.
pub fn build_payload(
    tool_name: &str,
    input_schema: &Value,
    required: &[&str],
    arguments: Option<Map<String, Value>>,
) -> Result<Map<String, Value>, AppError> {
    let arguments = arguments.unwrap_or_default();
    let properties = input_schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    for name in required {
        let value = arguments.get(*name).filter(|value| !value.is_null());
        let Some(value) = value else {
            return Err(missing_argument(tool_name, name));
        };

        let schema = properties.get(*name).unwrap_or(&Value::Null);
        check_required_value(tool_name, name, schema, value)?;
    }

    let mut payload = Map::new();
    for (name, schema) in &properties {
        match arguments.get(name).filter(|value| !value.is_null()) {
            Some(value) => {
                check_type(tool_name, name, schema, value)?;
                payload.insert(name.clone(), value.clone());
            }
            None => {
                if let Some(default) = schema.get("default") {
                    payload.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(payload)
}

fn check_required_value(
    tool_name: &str,
    name: &str,
    schema: &Value,
    value: &Value,
) -> Result<(), AppError> {
    let empty = match value {
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };

    if empty && expected_type(schema).is_some() {
        return Err(missing_argument(tool_name, name));
    }

    Ok(())
}

fn check_type(tool_name: &str, name: &str, schema: &Value, value: &Value) -> Result<(), AppError> {
    let Some(expected) = expected_type(schema) else {
        return Ok(());
    };

    let matches = match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };
    if !matches {
        return Err(AppError::bad_request(
            "invalid_argument",
            format!("{name} must be of type {expected} for {tool_name}"),
        ));
    }

    if let (Some(minimum), Some(actual)) = (
        schema.get("minimum").and_then(Value::as_f64),
        value.as_f64(),
    ) {
        if actual < minimum {
            return Err(AppError::bad_request(
                "invalid_argument",
                format!("{name} must be at least {minimum} for {tool_name}"),
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(AppError::bad_request(
                "invalid_argument",
                format!("{name} has an unsupported value for {tool_name}"),
            ));
        }
    }

    Ok(())
}

fn expected_type(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

fn missing_argument(tool_name: &str, name: &str) -> AppError {
    AppError::bad_request(
        "missing_argument",
        format!("{name} is required for {tool_name}"),
    )
}
