//! Compact parameter specs: `name[!][:type][{a,b}][=default][@description]`.
//!
//! ```
//! use agentic_tools::schemas::param_spec::parse_params;
//!
//! let params = parse_params(&["zip!:/^\\d{5}$/@Zip code", "mode:{auto,manual}=manual@Mode"]).unwrap();
//! assert!(params.get("zip").unwrap().check(Some(&"12345".into())).is_ok());
//! assert_eq!(params.get("mode").unwrap().description, "Mode Choices: auto, manual (default: manual)");
//! ```

use crate::{
    error::{AgentError, Result},
    schemas::tool_schema::{InputSchema, Properties, PropertySchema, SchemaType},
};
use regex::Regex;
use serde_json::{json, Value};
use std::{fmt, sync::OnceLock};

/// Value type a parameter accepts.
#[derive(Debug, Clone)]
pub enum ParamType {
    String,
    Int,
    Number,
    Boolean,
    Object,
    /// A JSON object or array, or a string holding one.
    Json,
    Array(Box<ParamType>),
    Enum(Vec<String>),
    /// A string matching the pattern.
    Regex(Regex),
}

impl ParamType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "int" => Some(ParamType::Int),
            "number" => Some(ParamType::Number),
            "boolean" => Some(ParamType::Boolean),
            "object" => Some(ParamType::Object),
            "json" => Some(ParamType::Json),
            _ => None,
        }
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            ParamType::Enum(values) => Some(values),
            _ => None,
        }
    }

    pub fn pattern(&self) -> Option<&Regex> {
        match self {
            ParamType::Regex(regex) => Some(regex),
            _ => None,
        }
    }

    pub(crate) fn to_property(&self) -> PropertySchema {
        match self {
            ParamType::String | ParamType::Regex(_) => PropertySchema::string(),
            ParamType::Int => PropertySchema::of_type(SchemaType::Integer),
            ParamType::Number => PropertySchema::of_type(SchemaType::Number),
            ParamType::Boolean => PropertySchema::of_type(SchemaType::Boolean),
            ParamType::Object => PropertySchema::object(),
            ParamType::Json => PropertySchema::default(),
            ParamType::Array(element) => PropertySchema::array(element.to_property()),
            ParamType::Enum(values) => {
                let integers: Option<Vec<Value>> = values
                    .iter()
                    .map(|value| value.parse::<i64>().ok().map(Value::from))
                    .collect();
                match integers {
                    Some(numbers) if !numbers.is_empty() => PropertySchema {
                        schema_type: Some(SchemaType::Integer),
                        enum_values: Some(numbers),
                        ..PropertySchema::default()
                    },
                    _ => PropertySchema {
                        schema_type: Some(SchemaType::String),
                        enum_values: Some(values.iter().map(|v| json!(v)).collect()),
                        ..PropertySchema::default()
                    },
                }
            }
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String | ParamType::Regex(_) => f.write_str("string"),
            ParamType::Int => f.write_str("int"),
            ParamType::Number => f.write_str("number"),
            ParamType::Boolean => f.write_str("boolean"),
            ParamType::Object => f.write_str("object"),
            ParamType::Json => f.write_str("json"),
            ParamType::Array(element) => write!(f, "{element}[]"),
            ParamType::Enum(_) => f.write_str("enum"),
        }
    }
}

/// One parsed parameter spec.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    /// `!` was present. A default still makes the parameter optional.
    pub required: bool,
    pub default: Option<Value>,
    /// Explicit text plus the computed `Choices:`/`(default:)`/`Regex:` notes.
    pub description: String,
}

impl ParamSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        parse_spec(raw)
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some() || !self.required
    }

    pub fn to_property(&self) -> PropertySchema {
        let mut property = self.param_type.to_property();
        if let Some(default) = &self.default {
            property.default = Some(match (&property.schema_type, default) {
                (Some(SchemaType::Integer | SchemaType::Number), Value::String(text)) => text
                    .parse::<f64>()
                    .map(number_value)
                    .unwrap_or_else(|_| default.clone()),
                _ => default.clone(),
            });
        }
        if let Some(regex) = self.param_type.pattern() {
            property.pattern = Some(regex.as_str().to_string());
        }
        if !self.description.is_empty() {
            property.description = Some(self.description.clone());
        }
        property
    }
}

/// Parsed specs in input order.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    specs: Vec<ParamSpec>,
}

impl ParamSet {
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|spec| spec.name.clone()).collect()
    }

    /// JSON Schema for the whole set, in spec order.
    pub fn to_input_schema(&self) -> InputSchema {
        let properties: Properties = self
            .specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.to_property()))
            .collect();
        let required = self
            .specs
            .iter()
            .filter(|spec| !spec.is_optional())
            .map(|spec| spec.name.clone())
            .collect();
        InputSchema::new(properties, required)
    }
}

impl FromIterator<ParamSpec> for ParamSet {
    fn from_iter<I: IntoIterator<Item = ParamSpec>>(iter: I) -> Self {
        let mut set = ParamSet::default();
        for spec in iter {
            match set.specs.iter_mut().find(|existing| existing.name == spec.name) {
                Some(slot) => *slot = spec,
                None => set.specs.push(spec),
            }
        }
        set
    }
}

/// Parse every spec string, preserving order. A later spec with the same
/// name replaces the earlier one in place.
pub fn parse_params<S: AsRef<str>>(specs: &[S]) -> Result<ParamSet> {
    specs.iter().map(|raw| parse_spec(raw.as_ref())).collect()
}

/// Split a tool key of the form `"name @ description"`.
pub fn parse_tool_key(key: &str) -> (String, String) {
    match key.split_once('@') {
        Some((name, description)) if !name.trim().is_empty() => {
            (name.trim().to_string(), description.trim().to_string())
        }
        _ => (key.trim().to_string(), String::new()),
    }
}

fn regex_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(.+?)/([a-z]*)").expect("static regex"))
}

fn regex_anywhere() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/[^/]+/[a-z]*").expect("static regex"))
}

fn braces_group() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("static regex"))
}

fn braces_lazy() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{.*?\}").expect("static regex"))
}

fn parse_spec(raw: &str) -> Result<ParamSpec> {
    let (head, description_raw) = raw.split_once('@').unwrap_or((raw, ""));

    let (mut raw_param, mut type_text) = match head.split_once(':') {
        Some((param, type_text)) => (param.trim().to_string(), type_text.trim().to_string()),
        None => (head.trim().to_string(), String::new()),
    };
    let required = raw_param.contains('!');

    let mut default_raw: Option<String> = None;
    if type_text.is_empty() {
        if let Some((name, default)) = raw_param.clone().split_once('=') {
            raw_param = name.trim().to_string();
            default_raw = Some(default.to_string());
        }
        type_text = "string".to_string();
    }

    let mut pattern: Option<Regex> = None;
    if let Some(captures) = regex_literal().captures(&type_text) {
        let source = &captures[1];
        let flags = &captures[2];
        pattern = Some(compile_pattern(raw, source, flags)?);
        let rest = &type_text[captures[0].len()..];
        if let Some(default) = rest.strip_prefix('=') {
            default_raw = Some(default.to_string());
        }
        type_text = "string".to_string();
    }

    if default_raw.is_none() {
        if let Some((base, default)) = type_text.clone().split_once('=') {
            type_text = base.trim().to_string();
            default_raw = Some(default.to_string());
        }
    }

    let skip_enum = pattern.is_some()
        || type_text == "object"
        || type_text == "json"
        || type_text.ends_with("[]");
    let enum_values = if skip_enum {
        None
    } else {
        let haystack = format!("{} {}", regex_anywhere().replace_all(head, ""), description_raw);
        braces_group().captures(&haystack).map(|captures| {
            captures[1]
                .split(',')
                .map(|value| value.trim().to_string())
                .collect::<Vec<_>>()
        })
    };

    let name = braces_lazy()
        .replace_all(&raw_param.replacen('!', "", 1), "")
        .trim()
        .to_string();
    let explicit_description = braces_lazy()
        .replace_all(description_raw, "")
        .trim()
        .to_string();

    let param_type = if let Some(regex) = pattern {
        ParamType::Regex(regex)
    } else if let Some(element) = type_text.strip_suffix("[]") {
        ParamType::Array(Box::new(
            ParamType::from_name(element.trim()).unwrap_or(ParamType::String),
        ))
    } else if let Some(values) = enum_values {
        ParamType::Enum(values)
    } else {
        ParamType::from_name(&type_text).unwrap_or(ParamType::String)
    };

    let default = default_raw.map(|text| coerce_default(&text, &param_type));
    let description = compose_description(&explicit_description, &param_type, default.as_ref());

    Ok(ParamSpec {
        name,
        param_type,
        required,
        default,
        description,
    })
}

/// Compile `/source/flags`, carrying the flags inline (`(?i)…`) so the
/// pattern string keeps them when it is published in a schema.
fn compile_pattern(spec: &str, source: &str, flags: &str) -> Result<Regex> {
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            'g' | 'u' | 'y' | 'd' => {}
            other => {
                return Err(AgentError::SpecParse {
                    spec: spec.to_string(),
                    reason: format!("unsupported regex flag `{other}`"),
                })
            }
        }
    }
    let pattern = if inline.is_empty() {
        source.to_string()
    } else {
        format!("(?{inline}){source}")
    };
    Regex::new(&pattern).map_err(|err| AgentError::SpecParse {
        spec: spec.to_string(),
        reason: err.to_string(),
    })
}

/// `/source/flags` for a pattern built by [`compile_pattern`].
fn render_regex(regex: &Regex) -> String {
    let text = regex.as_str();
    let split = text
        .strip_prefix("(?")
        .and_then(|rest| rest.split_once(')'))
        .filter(|(flags, _)| !flags.is_empty() && flags.chars().all(|flag| "ims".contains(flag)));
    match split {
        Some((flags, source)) => format!("/{source}/{flags}"),
        None => format!("/{text}/"),
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        json!(number as i64)
    } else {
        json!(number)
    }
}

fn coerce_default(text: &str, param_type: &ParamType) -> Value {
    match param_type {
        ParamType::Int | ParamType::Number => text
            .trim()
            .parse::<f64>()
            .map(number_value)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        ParamType::Boolean => Value::Bool(text.trim() == "true"),
        ParamType::Object | ParamType::Json | ParamType::Array(_) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => Value::String(text.to_string()),
    }
}

fn render_default(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn compose_description(explicit: &str, param_type: &ParamType, default: Option<&Value>) -> String {
    let mut parts = Vec::new();
    if !explicit.is_empty() {
        parts.push(explicit.to_string());
    }
    if let Some(values) = param_type.enum_values() {
        parts.push(format!("Choices: {}", values.join(", ")));
    }
    if let Some(default) = default {
        parts.push(format!("(default: {})", render_default(default)));
    }
    if let Some(regex) = param_type.pattern() {
        parts.push(format!("Regex: {}", render_regex(regex)));
    }
    parts.join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(spec: &str) -> ParamSpec {
        ParamSpec::parse(spec).unwrap()
    }

    #[test]
    fn required_regex_spec() {
        let spec = one(r"zip!:/^\d{5}$/@Zip code");
        assert_eq!(spec.name, "zip");
        assert!(spec.required);
        assert!(matches!(spec.param_type, ParamType::Regex(_)));
        assert_eq!(spec.description, r"Zip code Regex: /^\d{5}$/");
    }

    #[test]
    fn enum_with_default_is_optional() {
        let spec = one("env!:{dev,prod}=dev@Env");
        assert_eq!(spec.name, "env");
        assert_eq!(spec.param_type.enum_values().unwrap(), ["dev", "prod"]);
        assert_eq!(spec.default, Some(json!("dev")));
        assert!(spec.is_optional());
    }

    #[test]
    fn enum_after_name_without_type() {
        let spec = one("fruit!{apple,banana,pear}@Pick a fruit");
        assert_eq!(spec.name, "fruit");
        assert!(!spec.is_optional());
        assert_eq!(
            spec.description,
            "Pick a fruit Choices: apple, banana, pear"
        );
    }

    #[test]
    fn defaults_are_coerced_to_the_declared_type() {
        assert_eq!(one("count:int=10@Count").default, Some(json!(10)));
        assert_eq!(one("ratio:number=2.5").default, Some(json!(2.5)));
        assert_eq!(one("on:boolean=true").default, Some(json!(true)));
        assert_eq!(one("off:boolean=false").default, Some(json!(false)));
        assert_eq!(one("list:number[]=[1,2,3]").default, Some(json!([1, 2, 3])));
        assert_eq!(
            one(r#"prefs:object={ "theme": "dark" }@Preferences"#).default,
            Some(json!({"theme": "dark"}))
        );
        assert_eq!(one("raw:object={broken").default, Some(json!("{broken")));
        assert_eq!(one("status=active user@Status").default, Some(json!("active user")));
    }

    #[test]
    fn regex_default_and_flags() {
        let spec = one("code:/^[a-z]{3}$/i=abc");
        assert_eq!(spec.default, Some(json!("abc")));
        assert!(spec.param_type.pattern().unwrap().is_match("XYZ"));
        assert!(spec.description.ends_with("Regex: /^[a-z]{3}$/i"));

        let property = spec.to_property();
        assert_eq!(property.pattern.as_deref(), Some("(?i)^[a-z]{3}$"));
        let published = Regex::new(property.pattern.as_deref().unwrap()).unwrap();
        assert!(published.is_match("XYZ"));
    }

    #[test]
    fn malformed_regex_is_fatal() {
        let err = ParamSpec::parse("bad:/([a-z/").unwrap_err();
        assert_eq!(err.error_code(), "SPEC_PARSE_ERROR");
        assert!(ParamSpec::parse("odd:/abc/z").is_err());
    }

    #[test]
    fn enum_skipped_for_arrays_and_objects() {
        assert!(matches!(
            one("tags:string[]@Tags {a,b}").param_type,
            ParamType::Array(_)
        ));
        assert!(matches!(one("cfg:object@Cfg {a,b}").param_type, ParamType::Object));
    }

    #[test]
    fn set_preserves_order_and_builds_schema() {
        let set = parse_params(&[
            "name!:string@Name",
            "age:int=3",
            "level:{1,2,3}",
            r"zip:/^\d{5}$/",
        ])
        .unwrap();
        assert_eq!(set.names(), ["name", "age", "level", "zip"]);

        let schema = set.to_input_schema();
        assert_eq!(schema.required, ["name"]);
        let wire = serde_json::to_value(&schema).unwrap();
        assert_eq!(wire["properties"]["age"]["type"], "integer");
        assert_eq!(wire["properties"]["age"]["default"], 3);
        assert_eq!(wire["properties"]["level"]["enum"], json!([1, 2, 3]));
        assert_eq!(wire["properties"]["zip"]["pattern"], r"^\d{5}$");
    }

    #[test]
    fn tool_key_split() {
        assert_eq!(
            parse_tool_key("weather @ Current weather"),
            ("weather".to_string(), "Current weather".to_string())
        );
        assert_eq!(parse_tool_key("plain"), ("plain".to_string(), String::new()));
    }
}
