//!
//! Google/Gemini tool wire shapes ↔ IR conversion.
//!
//! Google function declarations use bare `{name, description, parameters}`
//! objects with upper-case JSON-Schema type tokens, tool choice travels as a
//! `function_calling_config`, and function calls carry `{name, args}` with
//! no id. Missing ids are synthesised deterministically from the positional
//! index within the assistant message.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value, json};

use crate::error::{ProxyError, Result};
use crate::ir::{ToolCallPart, ToolChoice, ToolDefinition};

/* --- atomic conversions ---------------------------------------------------------------------- */

///
/// Google function declaration → IR tool definition.
///
/// Upper-case type tokens (`OBJECT`, `STRING`, …) are normalised to the
/// lower-case JSON-Schema spelling on the way in.
pub fn tool_to_ir(value: &Value) -> Result<ToolDefinition> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("function declaration without name".into()))?;

    let parameters = value
        .get("parameters")
        .cloned()
        .map(|p| normalize_schema_types(&p))
        .unwrap_or_else(|| json!({"type": "object"}));

    Ok(ToolDefinition {
        name: name.to_string(),
        description: value.get("description").and_then(Value::as_str).map(str::to_string),
        parameters,
    })
}

///
/// IR tool definition → Google function declaration.
pub fn ir_tool_to_wire(tool: &ToolDefinition) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), Value::String(tool.name.clone()));
    if let Some(description) = &tool.description {
        map.insert("description".into(), Value::String(description.clone()));
    }
    map.insert("parameters".into(), tool.parameters.clone());
    Value::Object(map)
}

///
/// Google `function_calling_config` → IR tool choice.
pub fn tool_choice_to_ir(value: &Value) -> Result<ToolChoice> {
    let config = value
        .get("function_calling_config")
        .and_then(Value::as_object)
        .ok_or_else(|| ProxyError::BadRequest("expected function_calling_config".into()))?;

    match config.get("mode").and_then(Value::as_str) {
        Some("AUTO") | Some("auto") => Ok(ToolChoice::Auto),
        Some("NONE") | Some("none") => Ok(ToolChoice::None),
        Some("ANY") | Some("any") => {
            let allowed = config.get("allowed_function_names").and_then(Value::as_array);
            match allowed {
                Some(names) if names.len() == 1 => {
                    let name = names[0]
                        .as_str()
                        .ok_or_else(|| ProxyError::BadRequest("allowed_function_names must hold strings".into()))?;
                    Ok(ToolChoice::Specific { name: name.to_string() })
                }
                _ => Ok(ToolChoice::Required),
            }
        }
        other => Err(ProxyError::BadRequest(format!("unknown function calling mode {:?}", other))),
    }
}

///
/// IR tool choice → Google `function_calling_config`.
pub fn ir_tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"function_calling_config": {"mode": "AUTO"}}),
        ToolChoice::None => json!({"function_calling_config": {"mode": "NONE"}}),
        ToolChoice::Required => json!({"function_calling_config": {"mode": "ANY"}}),
        ToolChoice::Specific { name } => json!({
            "function_calling_config": {"mode": "ANY", "allowed_function_names": [name]}
        }),
    }
}

///
/// Google function call → IR tool call.
///
/// Accepts both the bare `{name, args}` shape and the nested
/// `{functionCall: {name, args}}` part shape. Google supplies no id, so one
/// is synthesised as `call_<index>` from the position within the message.
pub fn tool_call_to_ir(value: &Value, index: usize) -> Result<ToolCallPart> {
    let call = value.get("functionCall").or_else(|| value.get("function_call")).unwrap_or(value);

    let name = call
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::BadRequest("function call without name".into()))?;

    let id = call
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", index));

    Ok(ToolCallPart {
        id,
        name: name.to_string(),
        arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
    })
}

///
/// IR tool call → Google function call part.
pub fn ir_tool_call_to_wire(call: &ToolCallPart) -> Value {
    json!({"functionCall": {"name": call.name, "args": call.arguments}})
}

/* --- helper functions ------------------------------------------------------------------------ */

///
/// Normalise upper-case Google schema type tokens to JSON-Schema spelling.
///
/// Applied recursively through `properties` and `items`.
pub fn normalize_schema_types(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                let value = match key.as_str() {
                    "type" => match value.as_str() {
                        Some(token) => Value::String(token.to_lowercase()),
                        None => normalize_schema_types(value),
                    },
                    _ => normalize_schema_types(value),
                };
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_schema_types).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_round_trip_normalises_types() {
        let wire = json!({
            "name": "dim_lights",
            "description": "Dim the lights.",
            "parameters": {
                "type": "OBJECT",
                "properties": {"brightness": {"type": "NUMBER"}},
                "required": ["brightness"]
            }
        });
        let tool = tool_to_ir(&wire).unwrap();
        assert_eq!(tool.parameters["type"], json!("object"));
        assert_eq!(tool.parameters["properties"]["brightness"]["type"], json!("number"));

        let back = ir_tool_to_wire(&tool);
        assert_eq!(back["name"], json!("dim_lights"));
    }

    #[test]
    fn test_tool_choice_modes() {
        assert_eq!(
            tool_choice_to_ir(&json!({"function_calling_config": {"mode": "AUTO"}})).unwrap(),
            ToolChoice::Auto
        );
        assert_eq!(
            tool_choice_to_ir(&json!({"function_calling_config": {"mode": "ANY"}})).unwrap(),
            ToolChoice::Required
        );
        let specific = tool_choice_to_ir(&json!({
            "function_calling_config": {"mode": "ANY", "allowed_function_names": ["f"]}
        }))
        .unwrap();
        assert_eq!(specific, ToolChoice::Specific { name: "f".into() });
        assert_eq!(
            ir_tool_choice_to_wire(&specific)["function_calling_config"]["allowed_function_names"],
            json!(["f"])
        );
    }

    #[test]
    fn test_function_call_id_synthesised_from_index() {
        let call = tool_call_to_ir(
            &json!({"functionCall": {"name": "power_disco_ball", "args": {"power": true}}}),
            1,
        )
        .unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.arguments, json!({"power": true}));
    }

    #[test]
    fn test_supplied_id_preserved() {
        let call = tool_call_to_ir(&json!({"name": "f", "args": {}, "id": "call_x"}), 0).unwrap();
        assert_eq!(call.id, "call_x");
    }
}
