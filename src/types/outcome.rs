use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Whether a chat exchange ended in plain text or went through a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Text,
    Tool,
}

/// A tool call that failed; the exchange itself still completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallError {
    pub tool: String,
    pub message: String,
}

/// One executed function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub call_id: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolCallError>,
}

/// Result of one logical chat turn.
///
/// For tool turns, `name`, `args` and `result` describe the first call and
/// `error` the first failure; `calls` lists every call across all hops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub error: Option<ToolCallError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<ToolCallRecord>,
}

impl ChatOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ChatKind::Text,
            text: text.into(),
            name: None,
            args: None,
            result: None,
            error: None,
            calls: Vec::new(),
        }
    }

    /// Summarize executed calls; `text` is the model's final reply.
    pub fn from_calls(calls: Vec<ToolCallRecord>, text: impl Into<String>) -> Self {
        let first = calls.first();
        Self {
            kind: ChatKind::Tool,
            text: text.into(),
            name: first.map(|call| call.name.clone()),
            args: first.map(|call| call.args.clone()),
            result: first.and_then(|call| call.result.clone()),
            error: calls.iter().find_map(|call| call.error.clone()),
            calls,
        }
    }

    pub fn is_tool(&self) -> bool {
        self.kind == ChatKind::Tool
    }
}

/// What a step produced, kept as `last` on the chain context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Empty,
    Text(String),
    Chat(ChatOutcome),
    Value(Value),
    List(Vec<Outcome>),
    Error(String),
    /// A value tagged with where it came from (a branch, a task, a state).
    Labeled { label: String, value: Box<Outcome> },
}

impl Outcome {
    pub fn labeled(label: impl Into<String>, value: Outcome) -> Self {
        Outcome::Labeled {
            label: label.into(),
            value: Box::new(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Outcome::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    /// Text view: plain text, a chat reply, or a JSON string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Outcome::Text(text) => Some(text),
            Outcome::Chat(chat) => Some(&chat.text),
            Outcome::Value(Value::String(text)) => Some(text),
            Outcome::Labeled { value, .. } => value.as_text(),
            _ => None,
        }
    }

    /// The tool result of a chat turn, or the carried JSON value.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Chat(chat) => chat.result.as_ref(),
            Outcome::Labeled { value, .. } => value.as_value(),
            _ => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatOutcome> {
        match self {
            Outcome::Chat(chat) => Some(chat),
            Outcome::Labeled { value, .. } => value.as_chat(),
            _ => None,
        }
    }

    /// JavaScript-style truthiness, used by conditional operators.
    pub fn truthy(&self) -> bool {
        match self {
            Outcome::Empty | Outcome::Error(_) => false,
            Outcome::Text(text) => !text.is_empty(),
            Outcome::Chat(chat) => match &chat.result {
                Some(result) => value_truthy(result),
                None => !chat.text.is_empty(),
            },
            Outcome::Value(value) => value_truthy(value),
            Outcome::List(_) => true,
            Outcome::Labeled { value, .. } => value.truthy(),
        }
    }

    /// Plain JSON rendering for memory and tool payloads.
    pub fn to_json(&self) -> Value {
        match self {
            Outcome::Empty => Value::Null,
            Outcome::Text(text) => Value::String(text.clone()),
            Outcome::Chat(chat) => serde_json::to_value(chat).unwrap_or(Value::Null),
            Outcome::Value(value) => value.clone(),
            Outcome::List(items) => Value::Array(items.iter().map(Outcome::to_json).collect()),
            Outcome::Error(message) => json!({ "error": message }),
            Outcome::Labeled { label, value } => json!({ "label": label, "value": value.to_json() }),
        }
    }
}

/// `null`, `false`, `0`, `""` are falsy; everything else is truthy.
pub fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Empty
    }
}

impl From<String> for Outcome {
    fn from(text: String) -> Self {
        Outcome::Text(text)
    }
}

impl From<&str> for Outcome {
    fn from(text: &str) -> Self {
        Outcome::Text(text.to_string())
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Outcome::Empty,
            value => Outcome::Value(value),
        }
    }
}

impl From<ChatOutcome> for Outcome {
    fn from(chat: ChatOutcome) -> Self {
        Outcome::Chat(chat)
    }
}

impl From<bool> for Outcome {
    fn from(flag: bool) -> Self {
        Outcome::Value(Value::Bool(flag))
    }
}

impl From<Vec<Outcome>> for Outcome {
    fn from(items: Vec<Outcome>) -> Self {
        Outcome::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_json_rules() {
        assert!(!Outcome::Empty.truthy());
        assert!(!Outcome::from(json!(0)).truthy());
        assert!(Outcome::from(json!({"choice": false})).truthy());
        assert!(!Outcome::from("").truthy());
        assert!(Outcome::from(true).truthy());
    }

    #[test]
    fn tool_outcome_summarizes_first_call_and_first_error() {
        let calls = vec![
            ToolCallRecord {
                name: "a".into(),
                call_id: "1".into(),
                args: json!({}),
                result: Some(json!(1)),
                error: None,
            },
            ToolCallRecord {
                name: "b".into(),
                call_id: "2".into(),
                args: json!({}),
                result: None,
                error: Some(ToolCallError {
                    tool: "b".into(),
                    message: "boom".into(),
                }),
            },
        ];
        let outcome = ChatOutcome::from_calls(calls, "done");
        assert_eq!(outcome.name.as_deref(), Some("a"));
        assert_eq!(outcome.result, Some(json!(1)));
        assert_eq!(outcome.error.as_ref().unwrap().tool, "b");
        assert_eq!(
            serde_json::to_value(ChatOutcome::text("hi")).unwrap(),
            json!({"type": "text", "text": "hi", "error": null})
        );
    }
}
