use crate::{
    error::{AgentError, Constraint, ValidationError},
    schemas::tool_schema::ToolSchema,
};
use jsonschema::{error::ValidationErrorKind, Draft, JSONSchema};
use serde_json::Value;

const MAX_SCHEMA_ERRORS: usize = 3;

/// Validate call arguments against a tool's input schema.
pub(crate) fn validate_arguments(schema: &ToolSchema, arguments: &Value) -> std::result::Result<(), AgentError> {
    let wire = schema.input_schema.to_wire();
    let validator = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&wire)
        .map_err(|err| {
            AgentError::Config(format!(
                "Failed to prepare `{}` schema for validation: {}",
                schema.name, err
            ))
        })?;

    if let Err(errors) = validator.validate(arguments) {
        let mut details = Vec::new();
        let mut first: Option<(String, Constraint)> = None;
        let mut truncated = false;

        for (idx, error) in errors.enumerate() {
            if idx >= MAX_SCHEMA_ERRORS {
                truncated = true;
                break;
            }
            let mut path = error.instance_path.to_string();
            let constraint = match &error.kind {
                ValidationErrorKind::Required { property } => {
                    if let Some(name) = property.as_str() {
                        path = format!("{}/{}", path, name);
                    }
                    Constraint::Required
                }
                ValidationErrorKind::Type { .. } => Constraint::Type,
                ValidationErrorKind::Enum { .. } => Constraint::Enum,
                ValidationErrorKind::Pattern { .. } => Constraint::Pattern,
                _ => Constraint::Schema,
            };
            let field = field_name(&path);
            details.push(format!("{}: {}", field, error));
            first.get_or_insert((field, constraint));
        }

        let mut detail_str = if details.is_empty() {
            "arguments failed schema validation".to_string()
        } else {
            details.join("; ")
        };
        if truncated {
            detail_str.push_str("; additional errors truncated");
        }

        let (field, constraint) = first.unwrap_or_else(|| ("<root>".to_string(), Constraint::Schema));
        return Err(AgentError::Validation(ValidationError::new(
            field,
            constraint,
            format!("arguments for `{}` do not match schema: {}", schema.name, detail_str),
        )));
    }

    Ok(())
}

fn field_name(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "<root>".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}
