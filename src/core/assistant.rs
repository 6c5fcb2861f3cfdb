use super::capability::{
    ChatCapability, ChatInput, ChatRequest, ChatResponse, FunctionCall, FunctionOutput, ToolChoice,
};
use crate::{
    config::{ChatConfig, DEFAULT_MODEL},
    error::{AgentError, Result},
    schemas::tool_schema::{InputSchema, Properties, PropertySchema, SchemaType, ToolSchema},
    services::{responses_client::ResponsesClient, tool_call_utils::parse_function_arguments},
    tools::{
        registry::ToolRegistry,
        tool::{ToolArgs, ToolFunction, ToolRecord},
    },
    types::outcome::{ChatOutcome, ToolCallError, ToolCallRecord},
};
use futures::future::join_all;
use serde_json::{json, Value};
use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

const DEFAULT_MAX_HOPS: usize = 8;

/// Options for one chat turn.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Replaces the assistant's own tools for this turn.
    pub tools: Option<ToolRegistry>,
    /// `Some(true)` requires a tool call, `Some(false)` disables tools.
    pub force: Option<bool>,
    pub instructions: Option<String>,
    /// Do not persist or continue the conversation.
    pub one_off: bool,
    /// Run a batch of tool calls one after another instead of concurrently.
    pub sequential: bool,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = Some(force);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn one_off(mut self) -> Self {
        self.one_off = true;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }
}

/// The fixed micro-schemas `choice()` forces the model through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChoiceKind {
    #[default]
    YesNo,
    Choice,
    Text,
}

impl ChoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceKind::YesNo => "yesno",
            ChoiceKind::Choice => "choice",
            ChoiceKind::Text => "text",
        }
    }

    pub fn default_instructions(&self) -> &'static str {
        match self {
            ChoiceKind::YesNo => {
                "Answer strictly by calling the yes/no tool with { choice: true | false } based on factual truth."
            }
            ChoiceKind::Choice => {
                "Respond strictly by calling the choice tool with { text: <your choice> }."
            }
            ChoiceKind::Text => "Respond strictly by calling the text tool with { text: <your text> }.",
        }
    }

    /// The single echo tool for this kind.
    pub fn toolset(&self) -> ToolRegistry {
        let (name, description, field, field_type) = match self {
            ChoiceKind::YesNo => ("Yes or No", "Provide a boolean choice", "choice", SchemaType::Boolean),
            ChoiceKind::Choice => (
                "Make a Choice",
                "Provide a choice as a callback",
                "text",
                SchemaType::String,
            ),
            ChoiceKind::Text => ("Make a Text Output", "Provide a text output", "text", SchemaType::String),
        };
        let mut properties = Properties::new();
        properties.insert(field, PropertySchema::of_type(field_type));
        let schema = ToolSchema::new(
            name,
            description,
            InputSchema::new(properties, vec![field.to_string()]),
        );
        let function = ToolFunction::from_async(name, |args: ToolArgs| async move {
            Ok(Some(args.into_value()))
        });
        std::iter::once(ToolRecord::new(schema, function)).collect()
    }
}

impl FromStr for ChoiceKind {
    type Err = AgentError;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "yesno" => Ok(ChoiceKind::YesNo),
            "choice" => Ok(ChoiceKind::Choice),
            "text" => Ok(ChoiceKind::Text),
            other => Err(AgentError::Config(format!("unknown choice kind '{other}'"))),
        }
    }
}

/// Options for [`ChatAssistant::choice`].
#[derive(Debug, Clone, Default)]
pub struct ChoiceOptions {
    pub kind: ChoiceKind,
    /// Replaces the kind's default toolset when non-empty.
    pub tools: Option<ToolRegistry>,
    pub instructions: Option<String>,
    pub one_off: bool,
}

impl ChoiceOptions {
    pub fn kind(kind: ChoiceKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn one_off(mut self) -> Self {
        self.one_off = true;
        self
    }
}

/// Overrides for [`ChatAssistant::fork`]; unset fields are inherited.
#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub tools: Option<ToolRegistry>,
}

/// Lowercase, with everything outside `[a-z0-9_-]` replaced by `_`.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Tools as sent on the wire for one turn: slugged names mapped back to records.
struct PreparedTools<'a> {
    entries: Vec<(String, &'a ToolRecord)>,
}

impl<'a> PreparedTools<'a> {
    fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            entries: registry
                .list()
                .iter()
                .map(|record| (slug(record.name()), record))
                .collect(),
        }
    }

    fn wire(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|(wire_name, record)| {
                json!({
                    "type": "function",
                    "name": wire_name,
                    "description": record.schema.description,
                    "parameters": record.schema.input_schema.to_wire(),
                })
            })
            .collect()
    }

    fn find(&self, name: &str) -> Option<&'a ToolRecord> {
        self.entries
            .iter()
            .find(|(wire_name, record)| wire_name == name || record.name() == name)
            .map(|(_, record)| *record)
    }

    fn original_name(&self, name: &str) -> String {
        self.find(name)
            .map(|record| record.name().to_string())
            .unwrap_or_else(|| name.to_string())
    }
}

struct Turn<'a> {
    tools: PreparedTools<'a>,
    instructions: String,
    tool_choice: ToolChoice,
    one_off: bool,
    sequential: bool,
}

/// Wraps a chat capability: sends prompts with bound tools, runs requested
/// tool calls and feeds their outputs back until the model answers.
pub struct ChatAssistant {
    client: Arc<dyn ChatCapability>,
    model: String,
    instructions: String,
    tools: ToolRegistry,
    prev: Mutex<Option<String>>,
    max_hops: usize,
}

impl std::fmt::Debug for ChatAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAssistant")
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field("tools", &self.tools.names())
            .field("continuation", &self.continuation())
            .finish()
    }
}

impl ChatAssistant {
    pub fn new(client: impl ChatCapability + 'static) -> Self {
        Self::from_client(Arc::new(client))
    }

    pub fn from_client(client: Arc<dyn ChatCapability>) -> Self {
        Self {
            client,
            model: DEFAULT_MODEL.to_string(),
            instructions: String::new(),
            tools: ToolRegistry::new(),
            prev: Mutex::new(None),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// HTTP-backed assistant configured from the environment.
    pub fn from_env() -> Result<Self> {
        let config = ChatConfig::from_env()?;
        Ok(Self::new(ResponsesClient::new(&config)?).with_model(config.model))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into().trim().to_string();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Upper bound on follow-up requests within one turn.
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Id of the last persisted response, used to continue the conversation.
    pub fn continuation(&self) -> Option<String> {
        self.prev.lock().ok().and_then(|prev| prev.clone())
    }

    pub fn set_continuation(&self, id: Option<String>) {
        if let Ok(mut prev) = self.prev.lock() {
            *prev = id;
        }
    }

    /// Forget the conversation; the next turn starts fresh.
    pub fn clear(&self) {
        self.set_continuation(None);
    }

    /// Merge tools by name; later records replace earlier ones.
    pub fn add_tools(&mut self, tools: impl IntoIterator<Item = ToolRecord>) -> &mut Self {
        for record in tools {
            self.tools.upsert(record);
        }
        self
    }

    /// Remove tools matching any of `names`, compared as given or slugged.
    pub fn remove_tools(&mut self, names: &[&str]) -> &mut Self {
        let slugs: Vec<String> = names.iter().map(|name| slug(name)).collect();
        self.tools.retain(|record| {
            !names.contains(&record.name()) && !slugs.contains(&slug(record.name()))
        });
        self
    }

    pub fn clear_tools(&mut self) -> &mut Self {
        self.tools.clear();
        self
    }

    /// A new assistant on the same client with copied tools and no
    /// conversation history.
    pub fn fork(&self, overrides: ForkOptions) -> Self {
        Self {
            client: Arc::clone(&self.client),
            model: overrides.model.unwrap_or_else(|| self.model.clone()),
            instructions: overrides
                .instructions
                .unwrap_or_else(|| self.instructions.clone()),
            tools: overrides.tools.unwrap_or_else(|| self.tools.clone()),
            prev: Mutex::new(None),
            max_hops: self.max_hops,
        }
    }

    pub async fn chat(&self, prompt: impl Into<ChatInput>, options: ChatOptions) -> Result<ChatOutcome> {
        let tools = options.tools.as_ref().unwrap_or(&self.tools);
        let turn = Turn {
            tools: PreparedTools::new(tools),
            instructions: options
                .instructions
                .unwrap_or_else(|| self.instructions.clone()),
            tool_choice: ToolChoice::from_force(options.force),
            one_off: options.one_off,
            sequential: options.sequential,
        };
        self.invoke(prompt.into(), turn).await
    }

    /// Chat with a tool call required.
    pub async fn decide(&self, prompt: impl Into<ChatInput>, options: ChatOptions) -> Result<ChatOutcome> {
        let available = options.tools.as_ref().unwrap_or(&self.tools);
        if available.is_empty() {
            return Err(AgentError::Config("decide: no tools available".to_string()));
        }
        self.chat(prompt, options.with_force(true)).await
    }

    /// Chat with the tool choice left to the model, whatever `force` says.
    pub async fn discuss(&self, prompt: impl Into<ChatInput>, options: ChatOptions) -> Result<ChatOutcome> {
        let options = ChatOptions {
            force: None,
            ..options
        };
        self.chat(prompt, options).await
    }

    /// A stateless exchange without tools.
    pub async fn solo(&self, prompt: impl Into<ChatInput>, options: ChatOptions) -> Result<ChatOutcome> {
        let options = ChatOptions {
            tools: Some(ToolRegistry::new()),
            force: Some(false),
            one_off: true,
            ..options
        };
        self.chat(prompt, options).await
    }

    /// Force a call to one of the fixed choice tools (or caller tools).
    pub async fn choice(&self, prompt: impl Into<ChatInput>, options: ChoiceOptions) -> Result<ChatOutcome> {
        let tools = match options.tools {
            Some(tools) if !tools.is_empty() => tools,
            _ => options.kind.toolset(),
        };
        let turn = Turn {
            tools: PreparedTools::new(&tools),
            instructions: options
                .instructions
                .unwrap_or_else(|| options.kind.default_instructions().to_string()),
            tool_choice: ToolChoice::Required,
            one_off: options.one_off,
            sequential: false,
        };
        self.invoke(prompt.into(), turn).await
    }

    async fn invoke(&self, input: ChatInput, turn: Turn<'_>) -> Result<ChatOutcome> {
        let wire_tools = turn.tools.wire();
        debug!(
            target: "agentic_tools::assistant",
            model = %self.model,
            tools = wire_tools.len(),
            tool_choice = turn.tool_choice.as_str(),
            one_off = turn.one_off,
            "chat turn"
        );

        let mut response = self
            .dispatch(ChatRequest {
                model: self.model.clone(),
                input,
                tools: wire_tools.clone(),
                instructions: turn.instructions.clone(),
                tool_choice: turn.tool_choice,
                store: !turn.one_off,
                previous_response_id: None,
            })
            .await?;

        let mut calls = Vec::new();
        let mut hops = 0;
        while !response.function_calls.is_empty() {
            if hops == self.max_hops {
                warn!(
                    target: "agentic_tools::assistant",
                    hops,
                    pending = response.function_calls.len(),
                    "tool hop limit reached; returning without running further calls"
                );
                break;
            }
            hops += 1;

            let batch = self
                .run_calls(&turn.tools, &response.function_calls, turn.sequential)
                .await;
            let outputs = batch
                .iter()
                .map(|call| -> Result<FunctionOutput> {
                    let output = call.result.clone().unwrap_or_else(|| json!(""));
                    Ok(FunctionOutput {
                        call_id: call.call_id.clone(),
                        output: serde_json::to_string(&output)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            calls.extend(batch);

            let previous_response_id = if turn.one_off { None } else { response.id.clone() };
            response = self
                .dispatch(ChatRequest {
                    model: self.model.clone(),
                    input: ChatInput::FunctionOutputs(outputs),
                    tools: wire_tools.clone(),
                    instructions: turn.instructions.clone(),
                    tool_choice: ToolChoice::Auto,
                    store: !turn.one_off,
                    previous_response_id,
                })
                .await?;
        }

        if calls.is_empty() {
            Ok(ChatOutcome::text(response.text))
        } else {
            Ok(ChatOutcome::from_calls(calls, response.text))
        }
    }

    async fn dispatch(&self, mut request: ChatRequest) -> Result<ChatResponse> {
        if request.store && request.previous_response_id.is_none() {
            request.previous_response_id = self.continuation();
        }
        let store = request.store;
        let response = self.client.respond(request).await?;
        if store {
            if let Some(id) = &response.id {
                self.set_continuation(Some(id.clone()));
            }
        }
        Ok(response)
    }

    async fn run_calls(
        &self,
        tools: &PreparedTools<'_>,
        calls: &[FunctionCall],
        sequential: bool,
    ) -> Vec<ToolCallRecord> {
        if sequential {
            let mut records = Vec::with_capacity(calls.len());
            for call in calls {
                records.push(run_call(tools, call).await);
            }
            records
        } else {
            join_all(calls.iter().map(|call| run_call(tools, call))).await
        }
    }
}

async fn run_call(tools: &PreparedTools<'_>, call: &FunctionCall) -> ToolCallRecord {
    let name = tools.original_name(&call.name);
    let mut record = ToolCallRecord {
        name: name.clone(),
        call_id: call.call_id.clone(),
        args: json!({}),
        result: None,
        error: None,
    };

    let outcome = match parse_function_arguments(&call.arguments, &name) {
        Ok(args) => {
            record.args = Value::Object(args.clone());
            match tools.find(&call.name) {
                Some(tool) => tool.invoke(Value::Object(args)).await,
                None => Err(AgentError::ToolNotFound(name.clone())),
            }
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(result) => record.result = Some(result),
        Err(err) => {
            debug!(target: "agentic_tools::assistant", tool = %name, error = %err, "tool call failed");
            let message = match err {
                AgentError::ToolNotFound(_) => "Tool not found".to_string(),
                AgentError::ToolExecution(message) => message,
                other => other.to_string(),
            };
            record.error = Some(ToolCallError { tool: name, message });
        }
    }
    record
}
