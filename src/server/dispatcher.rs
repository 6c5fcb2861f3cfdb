use crate::{
    chain::memory::Memory,
    error::{AgentError, Result},
    schemas::tool_schema::{SchemaType, ToolSchema},
    server::{
        content::normalize,
        inline::{InlineTool, ToolReply},
        rpc::{RpcRequest, RpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND},
    },
    tools::{registry::ToolRegistry, tool::ToolRecord},
};
use serde_json::{json, Map, Value};
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone)]
enum Served {
    Bound(ToolRecord),
    Inline(InlineTool),
}

impl Served {
    fn name(&self) -> &str {
        match self {
            Served::Bound(record) => record.name(),
            Served::Inline(tool) => &tool.name,
        }
    }

    fn schema(&self) -> ToolSchema {
        match self {
            Served::Bound(record) => record.schema.clone(),
            Served::Inline(tool) => tool.schema(),
        }
    }

    fn signature(&self) -> String {
        match self {
            Served::Bound(record) => schema_signature(&record.schema),
            Served::Inline(tool) => tool.signature(),
        }
    }
}

fn schema_signature(schema: &ToolSchema) -> String {
    let mut params: Vec<_> = schema.input_schema.properties.iter().collect();
    params.sort_by(|a, b| a.0.cmp(b.0));

    let sig = params
        .iter()
        .map(|(name, property)| {
            let optional = if schema.input_schema.is_required(name) { "" } else { "?" };
            let kind = property.schema_type.as_ref().map(SchemaType::as_str).unwrap_or("string");
            format!("{name}{optional}: {kind}")
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec![format!("{}({}) -> text", schema.name, sig)];
    if !schema.description.is_empty() {
        lines.push(format!("@{}", schema.description));
    }
    lines.extend(params.iter().map(|(name, property)| {
        format!("- {}: {}", name, property.description.as_deref().unwrap_or(""))
    }));
    lines.join("\n") + "\n"
}

/// Serves bound and inline tools over JSON-RPC 2.0.
///
/// The dispatcher works on request values; [`ToolServer::serve`] adds a
/// newline-delimited stream transport on top. A bad request never stops
/// the server, it only produces an error response.
#[derive(Debug, Clone)]
pub struct ToolServer {
    name: String,
    version: String,
    tools: Vec<Served>,
    store: Memory,
}

impl Default for ToolServer {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl ToolServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tools: Vec::new(),
            store: Memory::new(),
        }
    }

    /// Serve against an existing store instead of a fresh one.
    pub fn with_store(mut self, store: Memory) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Memory {
        &self.store
    }

    fn insert(&mut self, served: Served) {
        match self.tools.iter_mut().find(|tool| tool.name() == served.name()) {
            Some(slot) => *slot = served,
            None => self.tools.push(served),
        }
    }

    /// Serve a bound tool. A tool with the same name is replaced.
    pub fn register(&mut self, record: ToolRecord) -> &mut Self {
        self.insert(Served::Bound(record));
        self
    }

    pub fn register_registry(&mut self, registry: &ToolRegistry) -> &mut Self {
        for record in registry.list() {
            self.register(record.clone());
        }
        self
    }

    pub fn register_inline(&mut self, tool: InlineTool) -> &mut Self {
        self.insert(Served::Inline(tool));
        self
    }

    /// Declare and serve an inline tool from a `"name @ description"` key
    /// and parameter specs.
    pub fn tool<S, F, Fut>(&mut self, key: &str, specs: &[S], handler: F) -> Result<&mut Self>
    where
        S: AsRef<str>,
        F: Fn(Map<String, Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolReply>> + Send + 'static,
    {
        let tool = InlineTool::new(key, specs, handler)?;
        Ok(self.register_inline(tool))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    /// Wire descriptors, as returned by `tools/list`.
    pub fn list(&self) -> Vec<Value> {
        self.tools.iter().map(|tool| tool.schema().to_wire()).collect()
    }

    /// Plain-text signature listing of every served tool, for prompts.
    pub fn prompt(&self) -> String {
        self.tools
            .iter()
            .map(Served::signature)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Handle one request value. Notifications yield no response.
    pub async fn handle(&self, request: Value) -> Option<Value> {
        let id = request.get("id").cloned().filter(|id| !id.is_null());
        let request: RpcRequest = match serde_json::from_value(request) {
            Ok(request) => request,
            Err(err) => {
                warn!(target: "agentic_tools::server", error = %err, "invalid request");
                return Some(RpcResponse::invalid_request(id, err.to_string()).to_value());
            }
        };
        if request.jsonrpc != "2.0" {
            return Some(
                RpcResponse::invalid_request(request.id, "Unsupported jsonrpc version (expected 2.0)")
                    .to_value(),
            );
        }

        debug!(target: "agentic_tools::server", method = %request.method, "received request");
        let notification = request.is_notification();
        let response = match request.method.as_str() {
            "initialize" => self.initialize(request.id, request.params),
            "ping" => RpcResponse::success(request.id, json!({})),
            "tools/list" => RpcResponse::success(request.id, json!({ "tools": self.list() })),
            "tools/call" => self.call(request.id, request.params).await,
            method if notification => {
                debug!(target: "agentic_tools::server", method, "ignored notification");
                return None;
            }
            method => {
                warn!(target: "agentic_tools::server", method, "unknown method");
                RpcResponse::method_not_found(request.id, method)
            }
        };

        if notification {
            None
        } else {
            Some(response.to_value())
        }
    }

    /// Handle one line of input. Blank lines are skipped; unparseable ones
    /// get a `-32700` response.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let response = match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handle(request).await?,
            Err(err) => {
                warn!(target: "agentic_tools::server", error = %err, "parse error");
                RpcResponse::parse_error().to_value()
            }
        };
        Some(response.to_string())
    }

    /// Answer newline-delimited requests from `reader` until it closes.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(target: "agentic_tools::server", name = %self.name, tools = self.tools.len(), "serving");
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                writer.write_all(response.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    fn initialize(&self, id: Option<Value>, params: Option<Value>) -> RpcResponse {
        let protocol_version = params
            .as_ref()
            .and_then(|params| params.get("protocolVersion"))
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_PROTOCOL_VERSION));
        info!(target: "agentic_tools::server", %protocol_version, "initialize");
        RpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol_version,
                "serverInfo": { "name": self.name, "version": self.version },
                "capabilities": { "tools": { "listChanged": false } },
            }),
        )
    }

    async fn call(&self, id: Option<Value>, params: Option<Value>) -> RpcResponse {
        let params = params.unwrap_or(Value::Null);
        let field = |key: &str| params.get(key).filter(|value| !value.is_null());

        let Some(name) = field("tool").or_else(|| field("name")).and_then(Value::as_str) else {
            return RpcResponse::error(id, INVALID_PARAMS, "tools/call requires a tool name");
        };
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            warn!(target: "agentic_tools::server", tool = name, "tool not found");
            return RpcResponse::error(id, METHOD_NOT_FOUND, "Tool not found");
        };
        let input = field("input")
            .or_else(|| field("arguments"))
            .cloned()
            .unwrap_or(Value::Null);

        let result = match tool {
            Served::Bound(record) => self.call_bound(record, input).await,
            Served::Inline(tool) => self.call_inline(tool, input).await,
        };
        match result {
            Ok(result) => {
                debug!(target: "agentic_tools::server", tool = name, "tool returned");
                RpcResponse::success(id, result)
            }
            Err(err) => {
                warn!(target: "agentic_tools::server", tool = name, error = %err, "tool failed");
                RpcResponse::success(id, error_result(&err))
            }
        }
    }

    async fn call_bound(&self, record: &ToolRecord, input: Value) -> Result<Value> {
        let arguments = match input {
            Value::Array(values) => Value::Object(
                record
                    .schema
                    .param_order()
                    .into_iter()
                    .zip(values)
                    .collect(),
            ),
            other => other,
        };
        let value = record.invoke(arguments).await?;
        let content = match &value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Ok(json!({
            "content": content,
            "structuredContent": value,
            "isError": false,
        }))
    }

    async fn call_inline(&self, tool: &InlineTool, input: Value) -> Result<Value> {
        let arguments = match input {
            Value::Object(map) => map,
            Value::Array(values) => tool.spread(values),
            Value::Null => Map::new(),
            other => {
                return Err(AgentError::InvalidFunctionCall(format!(
                    "arguments for '{}' must be an object or array, got {}",
                    tool.name, other
                )))
            }
        };

        let reply = tool.call(arguments, self.store.snapshot()).await?;
        for (key, value) in &reply.delta {
            if value.is_null() {
                self.store.remove(key);
            } else {
                self.store.set(key.clone(), value.clone());
            }
        }

        let mut result = json!({
            "content": [normalize(reply.value.clone())],
            "structuredContent": reply.value,
            "isError": false,
        });
        if !reply.delta.is_empty() {
            result["_meta"] = json!({ "stateDelta": reply.delta });
        }
        Ok(result)
    }
}

fn error_result(err: &AgentError) -> Value {
    json!({
        "content": err.to_string(),
        "isError": true,
        "error": err.to_error_payload()["error"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schemas::{param_spec::parse_params, tool_schema::ToolSchema},
        tools::tool::{to_tool_value, ToolArgs, ToolFunction},
    };

    fn add_record() -> ToolRecord {
        let schema = ToolSchema::new(
            "add",
            "Add two numbers",
            parse_params(&["a!:int", "b!:int"]).unwrap().to_input_schema(),
        );
        let function = ToolFunction::from_async("add", |args: ToolArgs| async move {
            let value = args.into_value();
            to_tool_value(value["a"].as_i64().unwrap_or(0) + value["b"].as_i64().unwrap_or(0))
        });
        ToolRecord::new(schema, function)
    }

    fn server() -> ToolServer {
        let mut server = ToolServer::new("test-server", "0.0.1");
        server.register(add_record());
        server
            .tool(
                "remember @ Store a note",
                &["note!@What to remember"],
                |args: Map<String, Value>, memory: Map<String, Value>| async move {
                    let count = memory.get("count").and_then(Value::as_i64).unwrap_or(0) + 1;
                    Ok(ToolReply::new(format!("noted {}", args["note"].as_str().unwrap_or("")))
                        .with_delta("count", count))
                },
            )
            .unwrap();
        server
    }

    async fn rpc(server: &ToolServer, request: Value) -> Value {
        server.handle(request).await.expect("response")
    }

    #[tokio::test]
    async fn initialize_echoes_protocol_version() {
        let response = rpc(
            &server(),
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2025-03-26"}}),
        )
        .await;
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(response["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(response["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn lists_both_kinds_of_tools() {
        let response = rpc(&server(), json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "add");
        assert_eq!(tools[1]["name"], "remember");
        assert_eq!(tools[1]["inputSchema"]["required"], json!(["note"]));
    }

    #[tokio::test]
    async fn calls_bound_tools_with_object_or_array_input() {
        let server = server();
        let by_name = rpc(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "add", "arguments": {"a": 2, "b": 3}}}),
        )
        .await;
        assert_eq!(by_name["result"]["content"], "5");
        assert_eq!(by_name["result"]["structuredContent"], 5);
        assert_eq!(by_name["result"]["isError"], false);

        let spread = rpc(
            &server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"tool": "add", "input": [4, 6]}}),
        )
        .await;
        assert_eq!(spread["result"]["structuredContent"], 10);
    }

    #[tokio::test]
    async fn inline_tools_report_state_deltas() {
        let server = server();
        let call = json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "remember", "arguments": {"note": "milk"}}});
        let first = rpc(&server, call.clone()).await;
        assert_eq!(first["result"]["content"][0], json!({"type": "text", "text": "noted milk"}));
        assert_eq!(first["result"]["_meta"]["stateDelta"], json!({"count": 1}));

        let second = rpc(&server, call).await;
        assert_eq!(second["result"]["_meta"]["stateDelta"], json!({"count": 2}));
        assert_eq!(server.store().get("count"), Some(json!(2)));
    }

    #[tokio::test]
    async fn validation_failures_name_the_field() {
        let response = rpc(
            &server(),
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"name": "remember", "arguments": {}}}),
        )
        .await;
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["error"]["field"], "note");
        assert!(response["result"]["content"].as_str().unwrap().contains("note"));
    }

    #[tokio::test]
    async fn errors_never_stop_the_server() {
        let server = server();
        let missing = rpc(
            &server,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(missing["error"]["code"], -32601);
        assert_eq!(missing["error"]["message"], "Tool not found");

        let unknown = rpc(&server, json!({"jsonrpc": "2.0", "id": 8, "method": "resources/list"})).await;
        assert_eq!(unknown["error"]["message"], "Unknown method \"resources/list\"");

        let invalid = rpc(&server, json!({"id": 9, "method": "tools/list"})).await;
        assert_eq!(invalid["error"]["code"], -32600);
        assert_eq!(invalid["id"], 9);

        let garbage = server.handle_line("{not json").await.unwrap();
        let garbage: Value = serde_json::from_str(&garbage).unwrap();
        assert_eq!(garbage["error"]["code"], -32700);

        assert!(server
            .handle(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn serves_newline_delimited_streams() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":1}}}"#,
            "\n"
        );
        let mut output = Vec::new();
        server()
            .serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();
        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["result"]["structuredContent"], 2);
    }

    #[test]
    fn prompt_renders_signatures() {
        let text = server().prompt();
        assert!(text.contains("add(a: integer, b: integer) -> text\n@Add two numbers"));
        assert!(text.contains("remember(note: string) -> text\n@Store a note\n- note: What to remember"));
    }
}
