use crate::{
    error::{AgentError, Result},
    schemas::{
        param_spec::{parse_params, parse_tool_key, ParamSet},
        tool_schema::ToolSchema,
    },
};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::{fmt, future::Future, sync::Arc};

/// What a served handler hands back: its value plus the memory keys it wants
/// changed. A `null` in the delta removes the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolReply {
    pub value: Value,
    pub delta: Map<String, Value>,
}

impl ToolReply {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            delta: Map::new(),
        }
    }

    pub fn with_delta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.delta.insert(key.into(), value.into());
        self
    }
}

impl From<Value> for ToolReply {
    fn from(value: Value) -> Self {
        ToolReply::new(value)
    }
}

type InlineHandler =
    dyn Fn(Map<String, Value>, Map<String, Value>) -> BoxFuture<'static, Result<ToolReply>> + Send + Sync;

/// A tool declared with a `"name @ description"` key and compact parameter
/// specs. Handlers get the validated arguments and a read-only memory
/// snapshot.
#[derive(Clone)]
pub struct InlineTool {
    pub name: String,
    pub description: String,
    pub params: ParamSet,
    handler: Arc<InlineHandler>,
}

impl InlineTool {
    pub fn new<S, F, Fut>(key: &str, specs: &[S], handler: F) -> Result<Self>
    where
        S: AsRef<str>,
        F: Fn(Map<String, Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolReply>> + Send + 'static,
    {
        let (name, description) = parse_tool_key(key);
        if name.is_empty() {
            return Err(AgentError::Config(format!("tool key `{key}` has no name")));
        }
        Ok(Self {
            name,
            description,
            params: parse_params(specs)?,
            handler: Arc::new(move |args, memory| Box::pin(handler(args, memory))),
        })
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema::new(&self.name, &self.description, self.params.to_input_schema())
    }

    /// Spread a positional argument list over the declared parameters.
    pub fn spread(&self, values: Vec<Value>) -> Map<String, Value> {
        self.params.names().into_iter().zip(values).collect()
    }

    pub async fn call(&self, args: Map<String, Value>, memory: Map<String, Value>) -> Result<ToolReply> {
        let args = self.params.validate(&args)?;
        (self.handler)(args, memory).await
    }

    /// `name(a: int, b?: string) -> text`, the description and one line per
    /// parameter, sorted by name.
    pub fn signature(&self) -> String {
        let mut params: Vec<_> = self.params.iter().collect();
        params.sort_by(|a, b| a.name.cmp(&b.name));

        let sig = params
            .iter()
            .map(|spec| {
                let optional = if spec.is_optional() { "?" } else { "" };
                format!("{}{}: {}", spec.name, optional, spec.param_type)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut lines = vec![format!("{}({}) -> text", self.name, sig)];
        if !self.description.is_empty() {
            lines.push(format!("@{}", self.description));
        }
        lines.extend(
            params
                .iter()
                .map(|spec| format!("- {}: {}", spec.name, spec.description)),
        );
        lines.join("\n") + "\n"
    }
}

impl fmt::Debug for InlineTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineTool")
            .field("name", &self.name)
            .field("params", &self.params.names())
            .finish()
    }
}
