//! Static signature-to-schema extraction.
//!
//! Reads Rust source text with `syn` and turns every top-level `pub fn` into
//! a [`ToolSchema`]. Nothing is compiled or executed; constructs the reader
//! does not understand degrade to `string` or open `object` schemas.
//!
//! ```
//! use agentic_tools::extract::{RustSourceExtractor, SchemaExtractor};
//!
//! let source = r#"
//!     /// Greets someone
//!     pub fn greet(name: String, #[default = "Hello"] greeting: _) -> String {
//!         format!("{greeting}, {name}")
//!     }
//! "#;
//! let tools = RustSourceExtractor::new().extract(source);
//! assert_eq!(tools[0].name, "greet");
//! assert_eq!(tools[0].input_schema.required, ["name"]);
//! ```

mod docs;
mod types;

use crate::schemas::tool_schema::{InputSchema, Properties, PropertySchema, SchemaType, ToolSchema};
use docs::{doc_text, literal_value};
use serde_json::Value;
use syn::{FnArg, Item, ItemFn, Meta, Pat, PatType, Type, Visibility};
use tracing::warn;
use types::{is_option, TypeTables};

/// `source text → tool schemas`. The registry only depends on this seam, so
/// other strategies (hand-written schemas, typed params) can stand in.
pub trait SchemaExtractor {
    fn extract(&self, source: &str) -> Vec<ToolSchema>;
}

/// Extraction switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Lift the members of a lone struct-typed parameter to the top level.
    pub flatten_single_object_param: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            flatten_single_object_param: true,
        }
    }
}

/// The `syn`-based extractor.
#[derive(Debug, Clone, Default)]
pub struct RustSourceExtractor {
    options: ExtractOptions,
}

impl RustSourceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.options.flatten_single_object_param = flatten;
        self
    }
}

impl SchemaExtractor for RustSourceExtractor {
    fn extract(&self, source: &str) -> Vec<ToolSchema> {
        extract_tools(source, self.options)
    }
}

/// Extract schemas for every exported top-level function, in source order.
pub fn extract_tools(source: &str, options: ExtractOptions) -> Vec<ToolSchema> {
    let file = match syn::parse_file(source) {
        Ok(file) => file,
        Err(err) => {
            warn!(target: "agentic_tools::extract", "source did not parse: {}", err);
            return Vec::new();
        }
    };
    let tables = TypeTables::from_file(&file);

    file.items
        .iter()
        .filter_map(|item| match item {
            Item::Fn(item) if matches!(item.vis, Visibility::Public(_)) => Some(item),
            _ => None,
        })
        .map(|item| function_schema(item, &tables, options))
        .collect()
}

fn function_schema(item: &ItemFn, tables: &TypeTables<'_>, options: ExtractOptions) -> ToolSchema {
    let name = item.sig.ident.to_string();
    let description = doc_text(&item.attrs);
    let params: Vec<&PatType> = item
        .sig
        .inputs
        .iter()
        .filter_map(|input| match input {
            FnArg::Typed(param) => Some(param),
            FnArg::Receiver(_) => None,
        })
        .collect();

    match params.as_slice() {
        [] => ToolSchema::new(name, description, InputSchema::default()),
        [param] if options.flatten_single_object_param => {
            match tables.object_reference(&param.ty) {
                Some(object) => ToolSchema::new(name, description, InputSchema::from_object(object)),
                None => ToolSchema::new(name, description, grouped_schema(&params, tables))
                    .positional(true),
            }
        }
        _ => ToolSchema::new(name, description, grouped_schema(&params, tables)).positional(true),
    }
}

/// Every parameter becomes a top-level property, in declaration order.
fn grouped_schema(params: &[&PatType], tables: &TypeTables<'_>) -> InputSchema {
    let mut properties = Properties::new();
    let mut required = Vec::new();

    for (index, param) in params.iter().enumerate() {
        let name = param_name(&param.pat, index);
        let default = param_default(param);
        let mut property = match param.ty.as_ref() {
            Type::Infer(_) => infer_from_default(default.as_ref()),
            ty => tables.resolve(ty, "", 0),
        };
        let optional = default.is_some() || is_option(&param.ty);
        if let Some(default) = default {
            property.default = Some(default);
        }
        if !optional {
            required.push(name.clone());
        }
        properties.insert(name, property);
    }

    InputSchema::new(properties, required)
}

pub(crate) fn param_name(pat: &Pat, index: usize) -> String {
    match pat {
        Pat::Ident(ident) => ident.ident.to_string().trim_start_matches("r#").to_string(),
        Pat::Type(inner) => param_name(&inner.pat, index),
        _ => format!("arg{index}"),
    }
}

/// Value of a `#[default = <literal>]` parameter attribute.
pub(crate) fn param_default(param: &PatType) -> Option<Value> {
    param.attrs.iter().find_map(|attr| match &attr.meta {
        Meta::NameValue(nv) if nv.path.is_ident("default") => literal_value(&nv.value),
        _ => None,
    })
}

fn infer_from_default(default: Option<&Value>) -> PropertySchema {
    match default {
        Some(Value::String(_)) | None => PropertySchema::string(),
        Some(Value::Number(number)) if number.is_f64() => PropertySchema::of_type(SchemaType::Number),
        Some(Value::Number(_)) => PropertySchema::of_type(SchemaType::Integer),
        Some(Value::Bool(_)) => PropertySchema::of_type(SchemaType::Boolean),
        Some(Value::Array(_)) => PropertySchema::array(PropertySchema::default()),
        Some(_) => PropertySchema::object(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SOURCE: &str = r#"
        use serde::Deserialize;

        /// Temperature unit
        #[derive(Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum Unit { Celsius, Fahrenheit }

        pub enum Level { Low = 1, High = 3 }

        /// Forecast request
        #[derive(Deserialize)]
        pub struct ForecastQuery {
            /// City name
            pub city: String,
            /// Days ahead (default: 3)
            pub days: Option<u32>,
            pub unit: Unit,
            /// Raw filters, type: json
            pub filters: String,
            pub tags: Vec<String>,
        }

        pub type Query = ForecastQuery;

        pub struct Node { pub next: Option<Box<Node>> }

        /// Weather lookup
        pub fn forecast(query: ForecastQuery) -> String { String::new() }

        pub fn by_alias(query: &Query) -> String { String::new() }

        /// Echo back
        pub fn echo(text: String) -> String { text }

        pub fn greet(name: _, #[default = "Hello"] greeting: _, #[default = 2] times: _, #[default = true] loud: _) {}

        pub fn level(level: Level, note: Option<String>) {}

        pub fn ping() {}

        pub fn walk(node: Node) {}

        fn private_helper() {}
    "#;

    fn tools() -> Vec<ToolSchema> {
        RustSourceExtractor::new().extract(SOURCE)
    }

    fn find<'a>(tools: &'a [ToolSchema], name: &str) -> &'a ToolSchema {
        tools.iter().find(|tool| tool.name == name).unwrap()
    }

    #[test]
    fn exported_functions_in_source_order() {
        let names: Vec<_> = tools().into_iter().map(|tool| tool.name).collect();
        assert_eq!(
            names,
            ["forecast", "by_alias", "echo", "greet", "level", "ping", "walk"]
        );
    }

    #[test]
    fn single_struct_param_is_flattened() {
        let tools = tools();
        let forecast = find(&tools, "forecast");
        assert!(!forecast.positional);
        assert_eq!(forecast.description, "Weather lookup");
        assert_eq!(
            forecast.param_order(),
            ["city", "days", "unit", "filters", "tags"]
        );
        assert_eq!(forecast.input_schema.required, ["city", "unit", "filters", "tags"]);

        let properties = &forecast.input_schema.properties;
        assert_eq!(properties.get("city").unwrap().description.as_deref(), Some("City name"));
        assert_eq!(properties.get("days").unwrap().default, Some(json!(3)));
        assert_eq!(
            properties.get("unit").unwrap().enum_values,
            Some(vec![json!("celsius"), json!("fahrenheit")])
        );
        assert!(properties.get("filters").unwrap().is_object());
        assert_eq!(
            properties.get("tags").unwrap().items.as_ref().unwrap().schema_type,
            Some(SchemaType::String)
        );

        assert_eq!(find(&tools, "by_alias").param_order(), forecast.param_order());
    }

    #[test]
    fn flatten_can_be_disabled() {
        let tools = RustSourceExtractor::new().with_flatten(false).extract(SOURCE);
        let forecast = find(&tools, "forecast");
        assert!(forecast.positional);
        assert_eq!(forecast.param_order(), ["query"]);
        assert!(forecast.input_schema.properties.get("query").unwrap().is_object());
    }

    #[test]
    fn single_primitive_param_is_positional() {
        let tools = tools();
        let echo = find(&tools, "echo");
        assert!(echo.positional);
        assert_eq!(echo.input_schema.required, ["text"]);
    }

    #[test]
    fn defaults_infer_types_and_make_params_optional() {
        let tools = tools();
        let greet = find(&tools, "greet");
        assert!(greet.positional);
        assert_eq!(greet.input_schema.required, ["name"]);
        let wire = greet.input_schema.to_wire();
        assert_eq!(wire["properties"]["name"]["type"], "string");
        assert_eq!(wire["properties"]["greeting"], json!({"type": "string", "default": "Hello"}));
        assert_eq!(wire["properties"]["times"], json!({"type": "integer", "default": 2}));
        assert_eq!(wire["properties"]["loud"], json!({"type": "boolean", "default": true}));
    }

    #[test]
    fn integer_discriminants_give_numeric_enum() {
        let tools = tools();
        let level = find(&tools, "level");
        let property = level.input_schema.properties.get("level").unwrap();
        assert_eq!(property.schema_type, Some(SchemaType::Number));
        assert_eq!(property.enum_values, Some(vec![json!(1), json!(3)]));
        assert_eq!(level.input_schema.required, ["level"]);
    }

    #[test]
    fn zero_params_and_recursive_types() {
        let tools = tools();
        let ping = find(&tools, "ping");
        assert!(!ping.positional);
        assert!(ping.input_schema.properties.is_empty());

        let walk = find(&tools, "walk");
        assert!(walk.input_schema.properties.contains("next"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let first = serde_json::to_string(&tools()).unwrap();
        let second = serde_json::to_string(&tools()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unparsable_source_yields_nothing() {
        assert!(RustSourceExtractor::new().extract("pub fn (").is_empty());
    }
}
