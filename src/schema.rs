use serde_json::Value;

/// Validates tool arguments against the declared input schema before a
/// handler ever sees them. Supports the subset the tool catalog actually
/// uses: `type`, `properties`, `required`, `items`, `enum`. Properties not
/// named in the schema are allowed through.
pub(crate) fn validate(schema: &Value, args: &Value) -> Result<(), String> {
    validate_value(schema, args, "arguments")
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return Err(format!("{path}: must be one of [{}]", options.join(", ")));
        }
    }

    let Some(expected) = schema.get("type").and_then(|t| t.as_str()) else {
        return Ok(());
    };

    match expected {
        "object" => {
            let Some(map) = value.as_object() else {
                return Err(format!("{path}: expected object"));
            };
            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                for field in required {
                    let Some(name) = field.as_str() else { continue };
                    if !map.contains_key(name) {
                        return Err(format!("{path}: missing required field '{name}'"));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
                for (name, prop_schema) in properties {
                    if let Some(prop_value) = map.get(name) {
                        if prop_value.is_null() {
                            continue;
                        }
                        validate_value(prop_schema, prop_value, &format!("{path}.{name}"))?;
                    }
                }
            }
            Ok(())
        }
        "array" => {
            let Some(items) = value.as_array() else {
                return Err(format!("{path}: expected array"));
            };
            if let Some(item_schema) = schema.get("items") {
                for (idx, item) in items.iter().enumerate() {
                    validate_value(item_schema, item, &format!("{path}[{idx}]"))?;
                }
            }
            Ok(())
        }
        "string" => {
            if value.is_string() {
                Ok(())
            } else {
                Err(format!("{path}: expected string"))
            }
        }
        "integer" => {
            if value.is_i64() || value.is_u64() {
                Ok(())
            } else {
                Err(format!("{path}: expected integer"))
            }
        }
        "number" => {
            if value.is_number() {
                Ok(())
            } else {
                Err(format!("{path}: expected number"))
            }
        }
        "boolean" => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err(format!("{path}: expected boolean"))
            }
        }
        other => Err(format!("{path}: unsupported schema type '{other}'")),
    }
}
