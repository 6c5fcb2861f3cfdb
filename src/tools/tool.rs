use crate::{
    error::{AgentError, Constraint, Result, ValidationError},
    schemas::{
        schema::input_schema_for,
        tool_schema::{InputSchema, ToolSchema},
        validation::validate_arguments,
        validator::deserialize_args,
    },
};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::{fmt, future::Future, pin::Pin, sync::Arc};

/// Future returned by a tool handler. `None` means the tool produced no value.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>;

/// A tool implemented as a type: schema and executor in one place.
pub trait Tool: Send + Sync + fmt::Debug {
    /// The name of the tool (used in function calls)
    fn name(&self) -> &str;

    /// A description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters
    fn input_schema(&self) -> InputSchema;

    /// Whether arguments are spread in declared order
    fn positional(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments
    fn execute(
        &self,
        args: ToolArgs,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send + '_>>;
}

/// Arguments as delivered to a handler: the parsed object, or the object's
/// values spread in declared parameter order.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    Object(Map<String, Value>),
    Positional(Vec<Value>),
}

impl ToolArgs {
    fn lookup(&self, index: usize, name: &str, arity: usize) -> Option<Value> {
        match self {
            ToolArgs::Positional(values) => values.get(index).filter(|v| !v.is_null()).cloned(),
            ToolArgs::Object(map) => match map.get(name) {
                Some(value) if !value.is_null() => Some(value.clone()),
                _ if arity == 1 && !map.is_empty() => Some(Value::Object(map.clone())),
                _ => None,
            },
        }
    }

    /// Deserialize parameter `name` (at `index` when positional). Absent
    /// values fall back to `default`, then to `null` so `Option` parameters
    /// resolve to `None`. A lone parameter may receive the whole object,
    /// which is how flattened struct parameters arrive.
    pub fn take<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
        arity: usize,
        default: Option<Value>,
    ) -> Result<T> {
        let found = self.lookup(index, name, arity);
        let absent = found.is_none();
        let value = found.or(default).unwrap_or(Value::Null);

        deserialize_args::<T>(value).map_err(|err| {
            if absent {
                return AgentError::Validation(ValidationError::new(
                    name,
                    Constraint::Required,
                    "is required",
                ));
            }
            match err {
                AgentError::Validation(inner) => {
                    let field = if inner.field == "<root>" {
                        name.to_string()
                    } else {
                        format!("{}.{}", name, inner.field)
                    };
                    AgentError::Validation(ValidationError::new(field, inner.constraint, inner.message))
                }
                other => other,
            }
        })
    }

    pub fn into_value(self) -> Value {
        match self {
            ToolArgs::Object(map) => Value::Object(map),
            ToolArgs::Positional(values) => Value::Array(values),
        }
    }
}

/// Serialize a handler's output; unit and `null` become "no value".
pub fn to_tool_value<R: Serialize>(output: R) -> Result<Option<Value>> {
    match serde_json::to_value(output)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

type Handler = dyn Fn(ToolArgs) -> ToolFuture + Send + Sync;

/// A live, callable function reference, named after the function it wraps.
#[derive(Clone)]
pub struct ToolFunction {
    name: String,
    handler: Arc<Handler>,
}

impl ToolFunction {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> ToolFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }

    /// Wrap an async closure without boxing at the call site.
    pub fn from_async<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Self::new(name, move |args| Box::pin(handler(args)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: ToolArgs) -> ToolFuture {
        (self.handler)(args)
    }
}

impl fmt::Debug for ToolFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolFunction").field("name", &self.name).finish()
    }
}

/// A schema bound to the function that implements it.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub schema: ToolSchema,
    pub function: ToolFunction,
}

impl ToolRecord {
    pub fn new(schema: ToolSchema, function: ToolFunction) -> Self {
        Self { schema, function }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Bind a [`Tool`] implementation.
    pub fn from_tool<T: Tool + 'static>(tool: T) -> Self {
        let schema = ToolSchema::new(tool.name(), tool.description(), tool.input_schema())
            .positional(tool.positional());
        let tool = Arc::new(tool);
        let function = ToolFunction::new(schema.name.clone(), move |args| {
            let tool = Arc::clone(&tool);
            Box::pin(async move { tool.execute(args).await })
        });
        Self { schema, function }
    }

    /// Build a record whose schema comes from a `JsonSchema` parameter type.
    pub fn typed<P, R, F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let schema = ToolSchema::new(name, description, input_schema_for::<P>());
        let handler = Arc::new(handler);
        let function = ToolFunction::new(schema.name.clone(), move |args| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let params: P = deserialize_args(args.into_value())?;
                to_tool_value(handler(params).await?)
            })
        });
        Self { schema, function }
    }

    /// Shape raw call arguments for the handler: spread positional tools in
    /// declared order, hand the object through otherwise.
    pub fn shape_args(&self, arguments: Map<String, Value>) -> ToolArgs {
        if self.schema.positional {
            ToolArgs::Positional(
                self.schema
                    .param_order()
                    .iter()
                    .map(|name| arguments.get(name).cloned().unwrap_or(Value::Null))
                    .collect(),
            )
        } else {
            ToolArgs::Object(arguments)
        }
    }

    /// Validate `arguments` against the schema and run the function.
    pub async fn invoke(&self, arguments: Value) -> Result<Value> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(AgentError::InvalidFunctionCall(format!(
                    "arguments for '{}' must be an object, got {}",
                    self.schema.name, other
                )))
            }
        };
        validate_arguments(&self.schema, &Value::Object(arguments.clone()))?;

        self.function
            .call(self.shape_args(arguments))
            .await?
            .ok_or_else(|| AgentError::ToolExecution("Tool returned undefined".to_string()))
    }
}
