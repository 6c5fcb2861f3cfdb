//! Tool schemas: the wire data model, the compact parameter-spec language,
//! and argument validation.

pub mod param_spec;
pub mod schema;
pub mod tool_schema;
pub(crate) mod validation;
pub mod validator;

pub use param_spec::{parse_params, parse_tool_key, ParamSet, ParamSpec, ParamType};
pub use schema::{input_schema_for, schema_type_name};
pub use tool_schema::{InputSchema, Properties, PropertySchema, SchemaType, ToolSchema};
pub use validator::deserialize_args;
