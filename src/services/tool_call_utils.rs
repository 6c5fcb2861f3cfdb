use crate::{core::capability::FunctionCall, error::AgentError};
use serde_json::{Map, Value};

/// Function-call items of a Responses API body, in output order
pub(crate) fn extract_function_calls(body: &Value) -> Vec<FunctionCall> {
    output_items(body)
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
        .map(|item| FunctionCall {
            name: string_field(item, "name"),
            arguments: extract_arguments_str(item).to_string(),
            call_id: item
                .get("call_id")
                .or_else(|| item.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect()
}

/// Concatenated `output_text`, either the convenience field or the
/// message content parts
pub(crate) fn extract_output_text(body: &Value) -> String {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }
    output_items(body)
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

fn output_items(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn string_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse function arguments from JSON string; empty means no arguments
pub(crate) fn parse_function_arguments(
    arguments_str: &str,
    function_name: &str,
) -> Result<Map<String, Value>, AgentError> {
    if arguments_str.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments_str) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::InvalidFunctionCall(format!(
            "Arguments for tool '{}' must be an object, got {}",
            function_name, other
        ))),
        Err(err) => Err(AgentError::InvalidFunctionCall(format!(
            "Failed to parse arguments for tool '{}': {}",
            function_name, err
        ))),
    }
}

/// Extract arguments string from function call object
pub(crate) fn extract_arguments_str(function: &Value) -> &str {
    function
        .get("arguments")
        .and_then(|value| value.as_str())
        .unwrap_or("")
}
