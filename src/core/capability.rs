use crate::{
    error::Result,
    services::tool_call_utils::{extract_function_calls, extract_output_text},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How strongly the model is steered toward tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
}

impl ToolChoice {
    /// `Some(true)` forces a tool, `Some(false)` forbids tools.
    pub fn from_force(force: Option<bool>) -> Self {
        match force {
            Some(true) => ToolChoice::Required,
            Some(false) => ToolChoice::None,
            None => ToolChoice::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
            ToolChoice::None => "none",
        }
    }
}

/// Output of one function call, sent back to continue the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionOutput {
    pub call_id: String,
    pub output: String,
}

/// What the model is asked about.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatInput {
    Prompt(String),
    Messages(Vec<Value>),
    FunctionOutputs(Vec<FunctionOutput>),
}

impl ChatInput {
    pub fn to_wire(&self) -> Value {
        match self {
            ChatInput::Prompt(prompt) => json!([{ "role": "user", "content": prompt }]),
            ChatInput::Messages(messages) => Value::Array(messages.clone()),
            ChatInput::FunctionOutputs(outputs) => Value::Array(
                outputs
                    .iter()
                    .map(|output| {
                        json!({
                            "type": "function_call_output",
                            "call_id": output.call_id,
                            "output": output.output,
                        })
                    })
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ChatInput {
    fn from(prompt: &str) -> Self {
        ChatInput::Prompt(prompt.to_string())
    }
}

impl From<String> for ChatInput {
    fn from(prompt: String) -> Self {
        ChatInput::Prompt(prompt)
    }
}

impl From<Vec<Value>> for ChatInput {
    fn from(messages: Vec<Value>) -> Self {
        ChatInput::Messages(messages)
    }
}

/// One request to the chat capability.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub input: ChatInput,
    /// Function tools in wire format.
    pub tools: Vec<Value>,
    pub instructions: String,
    pub tool_choice: ToolChoice,
    /// Persist the exchange server-side so it can be continued.
    pub store: bool,
    pub previous_response_id: Option<String>,
}

impl ChatRequest {
    /// Request body in the Responses API shape.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "input": self.input.to_wire(),
            "tools": self.tools,
            "tool_choice": self.tool_choice.as_str(),
        });
        if !self.instructions.is_empty() {
            body["instructions"] = json!(self.instructions);
        }
        if self.store {
            body["store"] = json!(true);
            if let Some(previous) = &self.previous_response_id {
                body["previous_response_id"] = json!(previous);
            }
        }
        body
    }
}

/// A function call the model asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text, parsed by the caller.
    pub arguments: String,
    pub call_id: String,
}

/// The model's reply: text, function calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Continuation handle.
    pub id: Option<String>,
    pub text: String,
    pub function_calls: Vec<FunctionCall>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            function_calls: Vec::new(),
        }
    }

    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            id: None,
            text: String::new(),
            function_calls: calls,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parse a Responses API body.
    pub fn from_body(body: &Value) -> Self {
        Self {
            id: body.get("id").and_then(Value::as_str).map(str::to_string),
            text: extract_output_text(body),
            function_calls: extract_function_calls(body),
        }
    }
}

/// The opaque chat-completion capability: prompt plus tool specs in,
/// text or function-call requests out.
#[async_trait]
pub trait ChatCapability: Send + Sync {
    async fn respond(&self, request: ChatRequest) -> Result<ChatResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_off_requests_carry_no_continuation() {
        let request = ChatRequest {
            model: "m".into(),
            input: "hi".into(),
            tools: Vec::new(),
            instructions: String::new(),
            tool_choice: ToolChoice::from_force(Some(false)),
            store: false,
            previous_response_id: Some("resp_1".into()),
        };
        let body = request.to_body();
        assert_eq!(body["tool_choice"], "none");
        assert!(body.get("store").is_none());
        assert!(body.get("previous_response_id").is_none());
        assert_eq!(body["input"][0]["role"], "user");
    }

    #[test]
    fn parses_function_calls_and_text() {
        let body = json!({
            "id": "resp_9",
            "output": [
                {"type": "function_call", "name": "add", "arguments": "{\"a\":1}", "call_id": "c1"},
                {"type": "message", "content": [{"type": "output_text", "text": "thinking"}]}
            ]
        });
        let response = ChatResponse::from_body(&body);
        assert_eq!(response.id.as_deref(), Some("resp_9"));
        assert_eq!(response.text, "thinking");
        assert_eq!(response.function_calls[0].name, "add");
        assert_eq!(response.function_calls[0].call_id, "c1");
    }
}
