//! Tool argument validation.
//!
//! Validates an argument map against the top level of a tool's declared
//! JSON schema before dispatch. The whole error list is returned rather
//! than the first failure, so the model sees every problem at once.
//! Nested validation below the top level is intentionally not performed.

use serde_json::{Map, Value};

/// Validate `arguments` against `schema`. An empty vec means valid.
pub fn validate_arguments(arguments: &Map<String, Value>, schema: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(key) {
                errors.push(format!("Missing required parameter: {key}"));
            }
        }
    }

    let properties = schema["properties"].as_object();
    let additional_forbidden = schema["additionalProperties"] == Value::Bool(false);

    for (key, value) in arguments {
        match properties.and_then(|p| p.get(key)) {
            None => {
                if additional_forbidden {
                    errors.push(format!("Unknown parameter: {key}"));
                }
            }
            Some(declared) => {
                if let Some(expected) = declared["type"].as_str() {
                    if !type_matches(value, expected) {
                        errors.push(format!("Parameter '{key}' should be {expected}"));
                    }
                }
            }
        }
    }

    errors
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown schema types are not our business at this level.
        _ => true,
    }
}
