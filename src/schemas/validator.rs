use crate::{
    error::{AgentError, Constraint, Result, ValidationError},
    schemas::param_spec::{ParamSet, ParamSpec, ParamType},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Deserialize tool arguments into `T`, reporting the failing path.
pub fn deserialize_args<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_path_to_error::deserialize(params).map_err(|e| {
        let path = e.path().to_string();
        let field = if path == "." { "<root>".to_string() } else { path };
        AgentError::Validation(ValidationError::new(
            field,
            Constraint::Schema,
            e.inner().to_string(),
        ))
    })
}

impl ParamSpec {
    /// Check one argument. Absent (or `null`) values take the default when
    /// there is one; the returned value is what the handler should receive.
    pub fn check(&self, value: Option<&Value>) -> std::result::Result<Option<Value>, ValidationError> {
        match value {
            None | Some(Value::Null) => match &self.default {
                Some(default) => Ok(Some(default.clone())),
                None if self.required => Err(ValidationError::new(
                    &self.name,
                    Constraint::Required,
                    "is required",
                )),
                None => Ok(None),
            },
            Some(value) => check_type(&self.name, &self.param_type, value).map(Some),
        }
    }
}

impl ParamSet {
    /// Validate an argument object. Unknown keys are dropped and defaults
    /// filled in; the first failing parameter is reported.
    pub fn validate(&self, args: &Map<String, Value>) -> std::result::Result<Map<String, Value>, ValidationError> {
        let mut checked = Map::new();
        for spec in self.iter() {
            if let Some(value) = spec.check(args.get(&spec.name))? {
                checked.insert(spec.name.clone(), value);
            }
        }
        Ok(checked)
    }
}

fn type_error(field: &str, expected: &str, value: &Value) -> ValidationError {
    ValidationError::new(
        field,
        Constraint::Type,
        format!("expected {expected}, got {}", kind_of(value)),
    )
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_type(field: &str, param_type: &ParamType, value: &Value) -> std::result::Result<Value, ValidationError> {
    match param_type {
        ParamType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(type_error(field, "string", value)),
        },
        ParamType::Int => match value {
            Value::Number(number) if number.is_i64() || number.is_u64() => Ok(value.clone()),
            Value::Number(number) => match number.as_f64() {
                Some(float) if float.fract() == 0.0 => Ok(value.clone()),
                _ => Err(ValidationError::new(
                    field,
                    Constraint::Integer,
                    format!("expected integer, got {number}"),
                )),
            },
            _ => Err(type_error(field, "integer", value)),
        },
        ParamType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            _ => Err(type_error(field, "number", value)),
        },
        ParamType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(type_error(field, "boolean", value)),
        },
        ParamType::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            _ => Err(type_error(field, "object", value)),
        },
        ParamType::Json => match value {
            Value::Object(_) | Value::Array(_) => Ok(value.clone()),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Ok(parsed),
                _ => Err(type_error(field, "JSON object or array", value)),
            },
            _ => Err(type_error(field, "JSON object or array", value)),
        },
        ParamType::Array(element) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    check_type(&format!("{field}[{index}]"), element, item).map_err(|err| {
                        ValidationError::new(err.field, Constraint::Items, err.message)
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(type_error(field, "array", value)),
        },
        ParamType::Enum(values) => {
            let accepted = match value {
                Value::String(text) => values.iter().any(|choice| choice == text),
                Value::Number(number) => number.as_f64().is_some_and(|n| {
                    values
                        .iter()
                        .filter_map(|choice| choice.trim().parse::<f64>().ok())
                        .any(|choice| choice == n)
                }),
                _ => false,
            };
            if accepted {
                Ok(value.clone())
            } else {
                Err(ValidationError::new(
                    field,
                    Constraint::Enum,
                    format!("expected one of {}", values.join(", ")),
                ))
            }
        }
        ParamType::Regex(regex) => match value {
            Value::String(text) if regex.is_match(text) => Ok(value.clone()),
            Value::String(_) => Err(ValidationError::new(
                field,
                Constraint::Pattern,
                format!("does not match /{}/", regex.as_str()),
            )),
            _ => Err(type_error(field, "string", value)),
        },
    }
}
