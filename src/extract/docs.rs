use crate::schemas::tool_schema::{PropertySchema, SchemaType};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use syn::{punctuated::Punctuated, Attribute, Expr, ExprLit, Lit, Meta, Token, UnOp};

/// Joined `///` lines of an item, trimmed. Empty when undocumented.
pub(crate) fn doc_text(attrs: &[Attribute]) -> String {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit), ..
                }) => Some(lit.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    lines.join("\n").trim().to_string()
}

pub(crate) fn wants_json(doc: &str) -> bool {
    doc.to_lowercase().contains("type: json")
}

fn regex_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)regex:\s*/(.+)/[a-z]*").expect("static regex"))
}

fn default_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bdefault\b:?\s*([^\s,.)]+)").expect("static regex"))
}

/// Fill `pattern` and `default` from `regex: /../` and `default: x` markers.
pub(crate) fn apply_doc_markers(property: &mut PropertySchema, doc: &str) {
    if let Some(captures) = regex_marker().captures(doc) {
        property.pattern = Some(captures[1].to_string());
    }
    let Some(captures) = default_marker().captures(doc) else {
        return;
    };
    let raw = &captures[1];
    let numeric = matches!(
        property.schema_type,
        Some(SchemaType::Number | SchemaType::Integer)
    );

    if let Some(values) = &property.enum_values {
        let text = Value::String(raw.to_string());
        if values.contains(&text) {
            property.default = Some(text);
        } else if numeric {
            if let Some(number) = parse_number(raw).filter(|n| values.contains(n)) {
                property.default = Some(number);
            }
        }
        return;
    }

    property.default = Some(match property.schema_type {
        Some(SchemaType::Number | SchemaType::Integer) => {
            parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string()))
        }
        Some(SchemaType::Boolean) if raw == "true" || raw == "false" => Value::Bool(raw == "true"),
        _ => Value::String(raw.to_string()),
    });
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// The subset of `#[serde(...)]` that changes names or optionality.
#[derive(Debug, Default, Clone)]
pub(crate) struct SerdeAttrs {
    pub rename: Option<String>,
    pub rename_all: Option<String>,
    pub default: bool,
    pub skip: bool,
}

pub(crate) fn serde_attrs(attrs: &[Attribute]) -> SerdeAttrs {
    let mut result = SerdeAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        let Ok(items) = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated) else {
            continue;
        };
        for item in items {
            match &item {
                Meta::Path(path) if path.is_ident("default") => result.default = true,
                Meta::Path(path) if path.is_ident("skip") || path.is_ident("skip_deserializing") => {
                    result.skip = true
                }
                Meta::NameValue(nv) if nv.path.is_ident("default") => result.default = true,
                Meta::NameValue(nv) if nv.path.is_ident("rename") => {
                    result.rename = string_literal(&nv.value)
                }
                Meta::NameValue(nv) if nv.path.is_ident("rename_all") => {
                    result.rename_all = string_literal(&nv.value)
                }
                _ => {}
            }
        }
    }
    result
}

fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Some(lit.value()),
        _ => None,
    }
}

/// Literal expression as JSON: strings, numbers, booleans, negation and arrays.
pub(crate) fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Str(lit) => Some(Value::String(lit.value())),
            Lit::Char(lit) => Some(Value::String(lit.value().to_string())),
            Lit::Int(lit) => lit.base10_parse::<i64>().ok().map(Value::from),
            Lit::Float(lit) => lit
                .base10_parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            Lit::Bool(lit) => Some(Value::Bool(lit.value)),
            _ => None,
        },
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            match literal_value(&unary.expr)? {
                Value::Number(number) => {
                    if let Some(int) = number.as_i64() {
                        Some(Value::from(-int))
                    } else {
                        number
                            .as_f64()
                            .and_then(|float| serde_json::Number::from_f64(-float))
                            .map(Value::Number)
                    }
                }
                _ => None,
            }
        }
        Expr::Array(array) => array
            .elems
            .iter()
            .map(literal_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expr::Group(group) => literal_value(&group.expr),
        Expr::Paren(paren) => literal_value(&paren.expr),
        _ => None,
    }
}

/// Apply a serde `rename_all` rule to a field (`snake_case`) or variant
/// (`PascalCase`) identifier.
pub(crate) fn rename_case(name: &str, rule: &str, is_variant: bool) -> String {
    let words: Vec<String> = if is_variant {
        split_pascal(name)
    } else {
        name.split('_')
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .collect()
    };
    let capitalize = |word: &String| {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        }
    };
    match rule {
        "lowercase" => words.concat(),
        "UPPERCASE" => words.concat().to_uppercase(),
        "PascalCase" => words.iter().map(capitalize).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(index, word)| if index == 0 { word.clone() } else { capitalize(word) })
            .collect(),
        "snake_case" => words.join("_"),
        "SCREAMING_SNAKE_CASE" => words.join("_").to_uppercase(),
        "kebab-case" => words.join("-"),
        "SCREAMING-KEBAB-CASE" => words.join("-").to_uppercase(),
        _ => name.to_string(),
    }
}

fn split_pascal(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in name.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
